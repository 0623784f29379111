//! Fire-and-forget forwarding of raw records to the archival sink

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::traits::ArchivalSink;
use crate::types::*;

/// Counts reported once the archive has drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub archived: usize,
    pub failed: usize,
}

/// Hands records to a background task that writes them to the sink.
///
/// `submit` never waits on the sink, and a failing sink only increments
/// `ArchiveStats::failed`.
pub struct ArchiveDispatcher {
    sender: Option<mpsc::UnboundedSender<ArchivedRecord>>,
    worker: Option<JoinHandle<ArchiveStats>>,
}

impl ArchiveDispatcher {
    /// Spawn the drain task. Must be called from inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn ArchivalSink>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ArchivedRecord>();

        let worker = tokio::spawn(async move {
            let mut stats = ArchiveStats::default();
            while let Some(entry) = receiver.recv().await {
                match sink.archive(entry).await {
                    Ok(()) => stats.archived += 1,
                    Err(e) => {
                        if stats.failed == 0 {
                            tracing::warn!("Archival sink failed, continuing without it: {}", e);
                        } else {
                            tracing::debug!("Archival sink failed again: {}", e);
                        }
                        stats.failed += 1;
                    }
                }
            }
            stats
        });

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// A dispatcher with no sink attached; submissions are discarded
    pub fn disabled() -> Self {
        Self {
            sender: None,
            worker: None,
        }
    }

    /// Whether submissions reach a sink
    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue a record for archival without waiting
    pub fn submit(&self, entry: ArchivedRecord) {
        if let Some(sender) = &self.sender {
            if sender.send(entry).is_err() {
                tracing::warn!("Archive worker stopped; record not archived");
            }
        }
    }

    /// Close the queue and wait for every queued record to be written
    pub async fn finish(mut self) -> ArchiveStats {
        drop(self.sender.take());
        match self.worker.take() {
            Some(worker) => match worker.await {
                Ok(stats) => stats,
                Err(e) => {
                    tracing::error!("Archive worker panicked: {}", e);
                    ArchiveStats::default()
                }
            },
            None => ArchiveStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemoryArchive;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(n: i64) -> ArchivedRecord {
        ArchivedRecord {
            run_id: uuid::Uuid::new_v4(),
            record: RawRecord::new(json!({ "n": n })),
            decision: ArchiveDecision::Accepted,
        }
    }

    /// Fails every other write
    struct FlakySink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArchivalSink for FlakySink {
        async fn archive(&self, _entry: ArchivedRecord) -> ReconResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call % 2 == 0 {
                Err(ReconError::Archive("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_all_records_reach_sink() {
        let archive = MemoryArchive::new();
        let dispatcher = ArchiveDispatcher::spawn(Arc::new(archive.clone()));

        for n in 0..25 {
            dispatcher.submit(entry(n));
        }
        let stats = dispatcher.finish().await;

        assert_eq!(stats, ArchiveStats { archived: 25, failed: 0 });
        assert_eq!(archive.len(), 25);
    }

    #[tokio::test]
    async fn test_sink_failures_are_counted_not_fatal() {
        let dispatcher = ArchiveDispatcher::spawn(Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
        }));

        for n in 0..10 {
            dispatcher.submit(entry(n));
        }
        let stats = dispatcher.finish().await;

        assert_eq!(stats.archived, 5);
        assert_eq!(stats.failed, 5);
    }

    #[tokio::test]
    async fn test_disabled_dispatcher() {
        let dispatcher = ArchiveDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        dispatcher.submit(entry(1));
        assert_eq!(dispatcher.finish().await, ArchiveStats::default());
    }
}
