//! Audit orchestrator that runs normalization, reduction, and reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::pipeline::archive::{ArchiveDispatcher, ArchiveStats};
use crate::pipeline::normalizer::Normalizer;
use crate::pipeline::reducer::{reduce_all, ReductionStats};
use crate::reconciliation::{ReconciliationEngine, ReconciliationResult};
use crate::traits::*;
use crate::types::*;

/// Runs a point-in-time audit across the three ledgers
pub struct Auditor<E: RawEventSource, L: InternalLedgerSource, B: BankLedgerSource> {
    events: E,
    ledger: L,
    bank: B,
    archive: Option<Arc<dyn ArchivalSink>>,
    filter: Option<Arc<dyn CommercialFilter>>,
    config: AuditConfig,
    engine: ReconciliationEngine,
}

impl<E: RawEventSource, L: InternalLedgerSource, B: BankLedgerSource> Auditor<E, L, B> {
    /// Create an auditor with the default configuration and no archive
    pub fn new(events: E, ledger: L, bank: B) -> Self {
        Self {
            events,
            ledger,
            bank,
            archive: None,
            filter: None,
            config: AuditConfig::default(),
            engine: ReconciliationEngine::new(),
        }
    }

    /// Use a custom configuration
    pub fn with_config(mut self, config: AuditConfig) -> Self {
        self.config = config;
        self
    }

    /// Forward every raw record to an archival sink
    pub fn with_archive(mut self, archive: Arc<dyn ArchivalSink>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Replace the default commercial filter
    pub fn with_commercial_filter(mut self, filter: Arc<dyn CommercialFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Configuration the next run will use
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Run one audit.
    ///
    /// Fails only when a source cannot be read (or normalization panics);
    /// per-record problems are counted in the report instead.
    pub async fn run(&self) -> ReconResult<AuditReport> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!("Starting audit run {}", run_id);

        let (batch, orders, settlements) = tokio::try_join!(
            self.events.fetch_raw_records(),
            self.ledger.fetch_orders(),
            self.bank.fetch_settlements(),
        )?;
        tracing::info!(
            "Loaded {} raw records, {} orders, {} bank settlements",
            batch.records.len(),
            orders.len(),
            settlements.len()
        );

        let test_orders = orders
            .iter()
            .filter(|o| o.is_test)
            .map(|o| o.order_id.clone());
        let normalizer = match &self.filter {
            Some(filter) => Normalizer::with_filter(&self.config, Arc::clone(filter)),
            None => Normalizer::new(&self.config),
        }
        .with_test_orders(test_orders);

        let archive = match &self.archive {
            Some(sink) => ArchiveDispatcher::spawn(Arc::clone(sink)),
            None => ArchiveDispatcher::disabled(),
        };

        let records_read = batch.records.len();
        let unparseable = batch.unparseable;
        // Off the async task so the archive drain runs alongside normalization
        let (mut normalized, archive) = tokio::task::spawn_blocking(move || {
            let output = normalizer.normalize_batch(&batch.records, &archive, run_id);
            (output, archive)
        })
        .await
        .map_err(|e| ReconError::Task(format!("normalization: {e}")))?;
        normalized.rejections.unparseable = unparseable;
        let events_accepted = normalized.events.len();

        let events_without_order = if orders.is_empty() {
            0
        } else {
            let known: HashSet<&str> = orders.iter().map(|o| o.order_id.as_str()).collect();
            normalized
                .events
                .iter()
                .filter(|e| !known.contains(e.order_id.as_str()))
                .count()
        };
        if events_without_order > 0 {
            tracing::warn!(
                "{} accepted events reference orders missing from the internal ledger",
                events_without_order
            );
        }

        let reduction = reduce_all(normalized.events, self.config.parallel);
        let result = self.engine.reconcile(&reduction.reduced, &settlements);

        let archive_stats = archive.finish().await;
        if archive_stats.failed > 0 {
            tracing::warn!(
                "{} of {} records could not be archived",
                archive_stats.failed, records_read
            );
        }

        tracing::info!(
            "Audit run {} complete: gap {} {}",
            run_id,
            result.discrepancy_gap,
            self.config.reporting_currency
        );

        Ok(AuditReport {
            run_id,
            started_at,
            reporting_currency: self.config.reporting_currency.clone(),
            records_read,
            events_accepted,
            rejections: normalized.rejections,
            reduction: reduction.stats,
            events_without_order,
            archive: archive_stats,
            result,
        })
    }
}

/// Everything produced by one audit run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub reporting_currency: String,
    pub records_read: usize,
    pub events_accepted: usize,
    pub rejections: RejectionTally,
    pub reduction: ReductionStats,
    /// Accepted events whose order is not in the internal ledger
    pub events_without_order: usize,
    pub archive: ArchiveStats,
    pub result: ReconciliationResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MemoryArchive, MemoryBankLedger, MemoryEventSource, MemoryInternalLedger};
    use bigdecimal::BigDecimal;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Waits, inside normalization, for the archive to receive the first record
    struct AwaitsArchiveDrain {
        archive: MemoryArchive,
        calls: AtomicUsize,
        saw_drain: Arc<AtomicBool>,
    }

    impl CommercialFilter for AwaitsArchiveDrain {
        fn is_non_commercial(&self, _markers: &[&str]) -> bool {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                let deadline = Instant::now() + Duration::from_secs(5);
                while Instant::now() < deadline {
                    if !self.archive.is_empty() {
                        self.saw_drain.store(true, Ordering::SeqCst);
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
            false
        }
    }

    #[tokio::test]
    async fn test_archive_drains_during_normalization() {
        let record = |payment_id: &str| {
            RawRecord::new(json!({
                "payment_id": payment_id, "order_id": "ord_1", "amount_cents": 100,
                "status": "SUCCESS", "attempted_at": "2024-01-01T10:00:00Z"
            }))
        };
        let archive = MemoryArchive::new();
        let saw_drain = Arc::new(AtomicBool::new(false));
        let filter = AwaitsArchiveDrain {
            archive: archive.clone(),
            calls: AtomicUsize::new(0),
            saw_drain: Arc::clone(&saw_drain),
        };
        let config = AuditConfig {
            parallel: false,
            ..AuditConfig::default()
        };

        // Current-thread runtime: the drain only runs if normalization yields the thread
        let report = Auditor::new(
            MemoryEventSource::new(vec![record("pay_1"), record("pay_2")]),
            MemoryInternalLedger::default(),
            MemoryBankLedger::default(),
        )
        .with_config(config)
        .with_archive(Arc::new(archive.clone()))
        .with_commercial_filter(Arc::new(filter))
        .run()
        .await
        .unwrap();

        assert!(saw_drain.load(Ordering::SeqCst));
        assert_eq!(report.archive.archived, 2);
    }

    #[tokio::test]
    async fn test_auditor_basic_run() {
        let events = MemoryEventSource::new(vec![
            RawRecord::new(json!({
                "payment_id": "pay_1", "order_id": "ord_1", "amount_cents": 2500,
                "status": "SUCCESS", "attempted_at": "2024-01-01T10:00:00Z"
            })),
            RawRecord::new(json!({
                "event": { "type": "heartbeat", "ts": "2024-01-01T10:00:00Z" },
                "payload": { "Amount": null, "flags": ["noise"] }
            })),
        ]);
        let bank = MemoryBankLedger::new(vec![BankSettlement::new(
            "set_1".to_string(),
            "pay_1".to_string(),
            BigDecimal::from(25),
            Utc::now(),
        )]);
        let archive = MemoryArchive::new();

        let auditor = Auditor::new(events, MemoryInternalLedger::default(), bank)
            .with_archive(Arc::new(archive.clone()));
        let report = auditor.run().await.unwrap();

        assert_eq!(report.records_read, 2);
        assert_eq!(report.events_accepted, 1);
        assert_eq!(report.rejections.non_commercial, 1);
        assert_eq!(report.result.total_successful_sales, BigDecimal::from(25));
        assert_eq!(report.result.discrepancy_gap, BigDecimal::from(0));
        assert!(report.result.is_balanced());
        assert_eq!(report.archive.archived, 2);
        assert_eq!(archive.len(), 2);
    }
}
