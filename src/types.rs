//! Core types and data structures for the reconciliation pipeline

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A loosely-typed record exactly as received from the event source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Value);

impl RawRecord {
    /// Wrap an arbitrary JSON value
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a single JSON document (one JSONL line)
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input).map(Self)
    }

    /// Borrow the underlying JSON value
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Return the first non-null value found under any of the given JSON pointers
    pub fn lookup(&self, pointers: &[String]) -> Option<&Value> {
        pointers
            .iter()
            .filter_map(|pointer| self.0.pointer(pointer))
            .find(|value| !value.is_null())
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A batch of raw records plus the number of input lines that were not valid JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    pub records: Vec<RawRecord>,
    pub unparseable: usize,
}

impl RawBatch {
    /// A batch with no unparseable lines
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            unparseable: 0,
        }
    }
}

/// Outcome of a single payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// The attempt captured funds
    Success,
    /// The attempt was declined or errored
    Failed,
    /// The attempt has not resolved yet
    Pending,
}

impl PaymentStatus {
    /// Parse a status label case-insensitively
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "successful" | "captured" | "paid" => Some(Self::Success),
            "failed" | "failure" | "declined" | "error" => Some(Self::Failed),
            "pending" | "processing" | "attempted" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Infer a status from an event type such as `payment_succeeded`.
    /// Anything unrecognised is treated as still pending.
    pub fn from_event_type(event_type: &str) -> Self {
        let lowered = event_type.to_ascii_lowercase();
        if lowered.ends_with("succeeded") || lowered.ends_with("success") {
            Self::Success
        } else if lowered.ends_with("failed") {
            Self::Failed
        } else {
            Self::Pending
        }
    }
}

/// Canonical monetary record produced by the normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryEvent {
    pub payment_id: String,
    pub order_id: String,
    /// Always non-negative, scale 2
    pub amount_usd: BigDecimal,
    pub status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
    /// Accepted events have passed the commercial filter
    pub is_commercial: bool,
}

impl MonetaryEvent {
    /// Whether this attempt captured funds
    pub fn is_success(&self) -> bool {
        self.status == PaymentStatus::Success
    }
}

/// The single attempt that represents an order's settled outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedAttempt {
    /// The chosen successful event
    pub event: MonetaryEvent,
    /// All attempts seen for the order
    pub attempt_count: usize,
    /// Successful attempts seen for the order (only one of them is counted)
    pub success_count: usize,
}

impl ReducedAttempt {
    /// Payment id of the chosen attempt
    pub fn payment_id(&self) -> &str {
        &self.event.payment_id
    }

    /// Order the attempt belongs to
    pub fn order_id(&self) -> &str {
        &self.event.order_id
    }

    /// Revenue counted for the order
    pub fn amount_usd(&self) -> &BigDecimal {
        &self.event.amount_usd
    }
}

/// A line from the bank settlement ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankSettlement {
    /// Bank-side line identifier
    pub settlement_id: String,
    /// Internal payment reference; a blank value can never be matched
    pub payment_id: String,
    pub amount_usd: BigDecimal,
    pub settled_at: DateTime<Utc>,
}

impl BankSettlement {
    /// Create a settlement line
    pub fn new(
        settlement_id: String,
        payment_id: String,
        amount_usd: BigDecimal,
        settled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            settlement_id,
            payment_id,
            amount_usd,
            settled_at,
        }
    }

    /// Whether the bank line carries no usable payment reference
    pub fn is_unreferenced(&self) -> bool {
        self.payment_id.trim().is_empty()
    }
}

/// An order from the internal ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: Option<String>,
    pub order_total_usd: BigDecimal,
    pub currency: String,
    /// Test orders never contribute revenue
    pub is_test: bool,
    pub created_at: DateTime<Utc>,
}

/// Why a raw record was dropped by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RejectionReason {
    MalformedAmount,
    MissingIdentifier,
    NonCommercial,
    MalformedTimestamp,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectionReason::MalformedAmount => "malformed amount",
            RejectionReason::MissingIdentifier => "missing identifier",
            RejectionReason::NonCommercial => "non-commercial",
            RejectionReason::MalformedTimestamp => "malformed timestamp",
        };
        f.write_str(label)
    }
}

/// A per-record rejection. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("record rejected ({reason}): {detail}")]
pub struct Rejection {
    pub reason: RejectionReason,
    pub detail: String,
    /// The record's amount, when it could be parsed despite the rejection
    pub amount_usd: Option<BigDecimal>,
}

impl Rejection {
    /// Create a rejection with no amount attached
    pub fn new(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            amount_usd: None,
        }
    }

    /// Attach the amount parsed before the record was rejected
    pub fn with_amount(mut self, amount_usd: Option<BigDecimal>) -> Self {
        self.amount_usd = amount_usd;
        self
    }
}

/// Aggregate count of rejected records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionTally {
    pub malformed_amount: usize,
    pub missing_identifier: usize,
    pub non_commercial: usize,
    pub malformed_timestamp: usize,
    /// Source lines that were not valid JSON at all
    pub unparseable: usize,
    /// Sum of the amounts that could be parsed from rejected records
    pub rejected_amount_total: BigDecimal,
}

impl Default for RejectionTally {
    fn default() -> Self {
        Self {
            malformed_amount: 0,
            missing_identifier: 0,
            non_commercial: 0,
            malformed_timestamp: 0,
            unparseable: 0,
            rejected_amount_total: BigDecimal::from(0),
        }
    }
}

impl RejectionTally {
    /// Count one rejection
    pub fn record(&mut self, rejection: &Rejection) {
        match rejection.reason {
            RejectionReason::MalformedAmount => self.malformed_amount += 1,
            RejectionReason::MissingIdentifier => self.missing_identifier += 1,
            RejectionReason::NonCommercial => self.non_commercial += 1,
            RejectionReason::MalformedTimestamp => self.malformed_timestamp += 1,
        }
        if let Some(amount) = &rejection.amount_usd {
            self.rejected_amount_total += amount;
        }
    }

    /// Count for one reason
    pub fn count(&self, reason: RejectionReason) -> usize {
        match reason {
            RejectionReason::MalformedAmount => self.malformed_amount,
            RejectionReason::MissingIdentifier => self.missing_identifier,
            RejectionReason::NonCommercial => self.non_commercial,
            RejectionReason::MalformedTimestamp => self.malformed_timestamp,
        }
    }

    /// Total records rejected by the normalizer (excludes unparseable lines)
    pub fn total(&self) -> usize {
        self.malformed_amount + self.missing_identifier + self.non_commercial + self.malformed_timestamp
    }
}

/// The decision forwarded to the archival sink with each raw record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum ArchiveDecision {
    Accepted,
    Rejected(RejectionReason),
}

/// A raw record plus its normalization decision, written once to the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRecord {
    pub run_id: uuid::Uuid,
    pub record: RawRecord,
    pub decision: ArchiveDecision,
}

/// Which external collaborator an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    RawEvents,
    InternalLedger,
    BankLedger,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SourceKind::RawEvents => "raw event source",
            SourceKind::InternalLedger => "internal ledger",
            SourceKind::BankLedger => "bank ledger",
        };
        f.write_str(label)
    }
}

/// Errors that can abort a reconciliation run
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    #[error("{origin} unavailable: {reason}")]
    SourceUnavailable { origin: SourceKind, reason: String },
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Background task failed: {0}")]
    Task(String),
}

impl ReconError {
    /// Shorthand for [`ReconError::SourceUnavailable`]
    pub fn unavailable(origin: SourceKind, reason: impl Into<String>) -> Self {
        ReconError::SourceUnavailable {
            origin,
            reason: reason.into(),
        }
    }
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_skips_nulls_and_missing_paths() {
        let record = RawRecord::new(json!({
            "payload": { "Amount": null },
            "amount": "$5.00"
        }));
        let paths = vec![
            "/payload/missing".to_string(),
            "/payload/Amount".to_string(),
            "/amount".to_string(),
        ];
        assert_eq!(record.lookup(&paths), Some(&json!("$5.00")));
    }

    #[test]
    fn test_payment_status_parsing() {
        assert_eq!(PaymentStatus::parse("SUCCESS"), Some(PaymentStatus::Success));
        assert_eq!(PaymentStatus::parse(" Failed "), Some(PaymentStatus::Failed));
        assert_eq!(PaymentStatus::parse("pending"), Some(PaymentStatus::Pending));
        assert_eq!(PaymentStatus::parse("refunded"), None);

        assert_eq!(
            PaymentStatus::from_event_type("payment_succeeded"),
            PaymentStatus::Success
        );
        assert_eq!(
            PaymentStatus::from_event_type("PAYMENT_FAILED"),
            PaymentStatus::Failed
        );
        assert_eq!(
            PaymentStatus::from_event_type("payment_attempted"),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn test_rejection_tally() {
        let mut tally = RejectionTally::default();
        tally.record(
            &Rejection::new(RejectionReason::NonCommercial, "test flag")
                .with_amount(Some(BigDecimal::from(12))),
        );
        tally.record(&Rejection::new(RejectionReason::MalformedAmount, "bad"));
        tally.record(
            &Rejection::new(RejectionReason::MissingIdentifier, "no payment id")
                .with_amount(Some(BigDecimal::from(3))),
        );

        assert_eq!(tally.total(), 3);
        assert_eq!(tally.count(RejectionReason::NonCommercial), 1);
        assert_eq!(tally.count(RejectionReason::MalformedTimestamp), 0);
        assert_eq!(tally.rejected_amount_total, BigDecimal::from(15));
    }

    #[test]
    fn test_unreferenced_settlement() {
        let settlement = BankSettlement::new(
            "set_1".to_string(),
            "  ".to_string(),
            BigDecimal::from(10),
            Utc::now(),
        );
        assert!(settlement.is_unreferenced());
    }
}
