//! Normalization of raw records into canonical monetary events

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{AuditConfig, FieldPaths};
use crate::money::parse_amount;
use crate::pipeline::archive::ArchiveDispatcher;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{collect_markers, is_truthy, parse_timestamp, sanitize_identifier};

/// Turns raw records into [`MonetaryEvent`]s or [`Rejection`]s
pub struct Normalizer {
    fields: FieldPaths,
    filter: Arc<dyn CommercialFilter>,
    test_orders: HashSet<String>,
    parallel: bool,
}

/// Accepted events plus the tally of everything rejected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationOutput {
    pub events: Vec<MonetaryEvent>,
    pub rejections: RejectionTally,
}

impl Normalizer {
    /// Create a normalizer using the configured field paths and noise markers
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            fields: config.fields.clone(),
            filter: Arc::new(DefaultCommercialFilter::new(&config.noise_markers)),
            test_orders: HashSet::new(),
            parallel: config.parallel,
        }
    }

    /// Create a normalizer with a custom commercial filter
    pub fn with_filter(config: &AuditConfig, filter: Arc<dyn CommercialFilter>) -> Self {
        Self {
            filter,
            ..Self::new(config)
        }
    }

    /// Treat every event belonging to these orders as non-commercial
    pub fn with_test_orders(mut self, order_ids: impl IntoIterator<Item = String>) -> Self {
        self.test_orders.extend(order_ids);
        self
    }

    /// Normalize a single raw record.
    ///
    /// Every check is evaluated; when several fail, the reported reason
    /// follows the order non-commercial, missing identifier, malformed
    /// amount, malformed timestamp.
    pub fn normalize(&self, raw: &RawRecord) -> Result<MonetaryEvent, Rejection> {
        let event_type = raw
            .lookup(&self.fields.event_type)
            .and_then(|v| v.as_str());
        let payment_id = sanitize_identifier(raw.lookup(&self.fields.payment_id));
        let order_id = sanitize_identifier(raw.lookup(&self.fields.order_id));
        let amount = parse_amount(raw.lookup(&self.fields.amount));
        let occurred_at = parse_timestamp(raw.lookup(&self.fields.occurred_at));

        let parsed_amount = amount.as_ref().ok().map(|a| a.value.clone());

        let non_commercial = self.non_commercial_reason(raw, event_type, order_id.as_deref());
        if let Some(detail) = non_commercial {
            return Err(Rejection::new(RejectionReason::NonCommercial, detail)
                .with_amount(parsed_amount));
        }

        let (payment_id, order_id) = match (payment_id, order_id) {
            (Some(payment_id), Some(order_id)) => (payment_id, order_id),
            (None, _) => {
                return Err(
                    Rejection::new(RejectionReason::MissingIdentifier, "payment_id is missing")
                        .with_amount(parsed_amount),
                )
            }
            (_, None) => {
                return Err(
                    Rejection::new(RejectionReason::MissingIdentifier, "order_id is missing")
                        .with_amount(parsed_amount),
                )
            }
        };

        let amount_usd = match amount {
            Ok(parsed) => parsed.value,
            Err(e) => {
                return Err(Rejection::new(
                    RejectionReason::MalformedAmount,
                    format!("payment {payment_id}: {e}"),
                ))
            }
        };

        let Some(occurred_at) = occurred_at else {
            return Err(Rejection::new(
                RejectionReason::MalformedTimestamp,
                format!("payment {payment_id}: missing or unparseable timestamp"),
            )
            .with_amount(Some(amount_usd)));
        };

        // The event type only stands in for a status that is absent
        let status = match raw.lookup(&self.fields.status) {
            Some(value) => value
                .as_str()
                .and_then(PaymentStatus::parse)
                .unwrap_or(PaymentStatus::Pending),
            None => event_type
                .map(PaymentStatus::from_event_type)
                .unwrap_or(PaymentStatus::Pending),
        };

        Ok(MonetaryEvent {
            payment_id,
            order_id,
            amount_usd,
            status,
            occurred_at,
            is_commercial: true,
        })
    }

    fn non_commercial_reason(
        &self,
        raw: &RawRecord,
        event_type: Option<&str>,
        order_id: Option<&str>,
    ) -> Option<String> {
        let mut markers = collect_markers(raw.lookup(&self.fields.flags));
        markers.extend(event_type);

        if self.filter.is_non_commercial(&markers) {
            return Some(format!("noise marker in {markers:?}"));
        }
        if is_truthy(raw.lookup(&self.fields.test_flag)) {
            return Some("test flag set".to_string());
        }
        match order_id {
            Some(order_id) if self.test_orders.contains(order_id) => {
                Some(format!("order {order_id} is a test order"))
            }
            _ => None,
        }
    }

    /// Normalize a batch, forwarding every record to the archive.
    ///
    /// Output order of `events` follows input order.
    pub fn normalize_batch(
        &self,
        records: &[RawRecord],
        archive: &ArchiveDispatcher,
        run_id: Uuid,
    ) -> NormalizationOutput {
        let process = |raw: &RawRecord| {
            let outcome = self.normalize(raw);
            if archive.is_enabled() {
                let decision = match &outcome {
                    Ok(_) => ArchiveDecision::Accepted,
                    Err(rejection) => ArchiveDecision::Rejected(rejection.reason),
                };
                archive.submit(ArchivedRecord {
                    run_id,
                    record: raw.clone(),
                    decision,
                });
            }
            outcome
        };

        let outcomes: Vec<Result<MonetaryEvent, Rejection>> = if self.parallel {
            records.par_iter().map(process).collect()
        } else {
            records.iter().map(process).collect()
        };

        let mut output = NormalizationOutput::default();
        for outcome in outcomes {
            match outcome {
                Ok(event) => output.events.push(event),
                Err(rejection) => {
                    tracing::debug!("{}", rejection);
                    output.rejections.record(&rejection);
                }
            }
        }

        tracing::info!(
            "Normalized {} records: {} accepted, {} rejected (rejected amount {})",
            records.len(),
            output.events.len(),
            output.rejections.total(),
            output.rejections.rejected_amount_total
        );

        output
    }
}
