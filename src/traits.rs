//! Traits for the external collaborators and for extensibility

use async_trait::async_trait;

use crate::types::*;

/// Source of raw, untrusted event records
///
/// Implementations wrap whatever holds the event log (a JSONL file, a
/// document store, a message archive). Failing to read the source at all
/// must be reported as [`ReconError::SourceUnavailable`].
#[async_trait]
pub trait RawEventSource: Send + Sync {
    /// Read every raw record for the audit window
    async fn fetch_raw_records(&self) -> ReconResult<RawBatch>;
}

/// Write-once archival store for raw records and their decisions
///
/// The core never reads archived records back.
#[async_trait]
pub trait ArchivalSink: Send + Sync {
    /// Store one record
    async fn archive(&self, entry: ArchivedRecord) -> ReconResult<()>;
}

/// The internal order ledger
#[async_trait]
pub trait InternalLedgerSource: Send + Sync {
    /// List all orders in the audit window
    async fn fetch_orders(&self) -> ReconResult<Vec<Order>>;
}

/// The bank settlement ledger. Read-only and authoritative.
#[async_trait]
pub trait BankLedgerSource: Send + Sync {
    /// List every settlement line in the audit window
    async fn fetch_settlements(&self) -> ReconResult<Vec<BankSettlement>>;
}

/// Trait for deciding whether a record is commercial traffic
pub trait CommercialFilter: Send + Sync {
    /// `markers` holds the record's event type and flags, as found
    fn is_non_commercial(&self, markers: &[&str]) -> bool;
}

/// Default filter: any marker equal (ignoring case) to a configured noise marker
pub struct DefaultCommercialFilter {
    noise_markers: Vec<String>,
}

impl DefaultCommercialFilter {
    /// Create a filter for the given markers
    pub fn new<I, S>(noise_markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            noise_markers: noise_markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .collect(),
        }
    }
}

impl CommercialFilter for DefaultCommercialFilter {
    fn is_non_commercial(&self, markers: &[&str]) -> bool {
        markers.iter().any(|marker| {
            let marker = marker.trim().to_lowercase();
            self.noise_markers.iter().any(|noise| *noise == marker)
        })
    }
}
