//! In-memory sources and sinks for testing and development

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// Raw event source backed by a vector
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSource {
    batch: Arc<RwLock<RawBatch>>,
}

impl MemoryEventSource {
    /// Create a source that yields `records`
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            batch: Arc::new(RwLock::new(RawBatch::new(records))),
        }
    }

    /// Append a record
    pub fn push(&self, record: RawRecord) {
        if let Ok(mut batch) = self.batch.write() {
            batch.records.push(record);
        }
    }
}

#[async_trait]
impl RawEventSource for MemoryEventSource {
    async fn fetch_raw_records(&self) -> ReconResult<RawBatch> {
        self.batch
            .read()
            .map(|batch| batch.clone())
            .map_err(|e| ReconError::unavailable(SourceKind::RawEvents, e.to_string()))
    }
}

/// Internal order ledger backed by a vector
#[derive(Debug, Clone, Default)]
pub struct MemoryInternalLedger {
    orders: Arc<RwLock<Vec<Order>>>,
}

impl MemoryInternalLedger {
    /// Create a ledger holding `orders`
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders: Arc::new(RwLock::new(orders)),
        }
    }
}

#[async_trait]
impl InternalLedgerSource for MemoryInternalLedger {
    async fn fetch_orders(&self) -> ReconResult<Vec<Order>> {
        self.orders
            .read()
            .map(|orders| orders.clone())
            .map_err(|e| ReconError::unavailable(SourceKind::InternalLedger, e.to_string()))
    }
}

/// Bank settlement ledger backed by a vector
#[derive(Debug, Clone, Default)]
pub struct MemoryBankLedger {
    settlements: Arc<RwLock<Vec<BankSettlement>>>,
}

impl MemoryBankLedger {
    /// Create a bank ledger holding `settlements`
    pub fn new(settlements: Vec<BankSettlement>) -> Self {
        Self {
            settlements: Arc::new(RwLock::new(settlements)),
        }
    }
}

#[async_trait]
impl BankLedgerSource for MemoryBankLedger {
    async fn fetch_settlements(&self) -> ReconResult<Vec<BankSettlement>> {
        self.settlements
            .read()
            .map(|settlements| settlements.clone())
            .map_err(|e| ReconError::unavailable(SourceKind::BankLedger, e.to_string()))
    }
}

/// Archive that keeps every written record in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: Arc<RwLock<Vec<ArchivedRecord>>>,
}

impl MemoryArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything archived so far
    pub fn entries(&self) -> Vec<ArchivedRecord> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of archived records
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether nothing has been archived
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

#[async_trait]
impl ArchivalSink for MemoryArchive {
    async fn archive(&self, entry: ArchivedRecord) -> ReconResult<()> {
        self.entries
            .write()
            .map(|mut entries| entries.push(entry))
            .map_err(|e| ReconError::Archive(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_sources_return_contents() {
        let events = MemoryEventSource::new(vec![RawRecord::new(json!({"a": 1}))]);
        events.push(RawRecord::new(json!({"a": 2})));
        let batch = events.fetch_raw_records().await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.unparseable, 0);

        let bank = MemoryBankLedger::new(vec![BankSettlement::new(
            "set_1".to_string(),
            "pay_1".to_string(),
            BigDecimal::from(10),
            Utc::now(),
        )]);
        assert_eq!(bank.fetch_settlements().await.unwrap().len(), 1);

        let ledger = MemoryInternalLedger::default();
        assert!(ledger.fetch_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_archive() {
        let archive = MemoryArchive::new();
        assert!(archive.is_empty());

        archive
            .archive(ArchivedRecord {
                run_id: uuid::Uuid::new_v4(),
                record: RawRecord::new(json!({"event": {"type": "heartbeat"}})),
                decision: ArchiveDecision::Rejected(RejectionReason::NonCommercial),
            })
            .await
            .unwrap();

        assert_eq!(archive.len(), 1);
        assert_eq!(
            archive.entries()[0].decision,
            ArchiveDecision::Rejected(RejectionReason::NonCommercial)
        );

        archive.clear();
        assert!(archive.is_empty());
    }
}
