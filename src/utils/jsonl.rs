//! Newline-delimited JSON event log source

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::traits::RawEventSource;
use crate::types::*;

/// Parse a JSONL document. Blank lines are skipped; lines that are not
/// valid JSON are counted in `RawBatch::unparseable`.
pub fn parse_jsonl(input: &str) -> RawBatch {
    let mut batch = RawBatch::default();
    for (line_no, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match RawRecord::from_json_str(line) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                tracing::debug!("Skipping unparseable line {}: {}", line_no + 1, e);
                batch.unparseable += 1;
            }
        }
    }
    batch
}

/// Raw event source reading a JSONL file from disk
#[derive(Debug, Clone)]
pub struct JsonlEventSource {
    path: PathBuf,
}

impl JsonlEventSource {
    /// Read records from the JSONL file at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RawEventSource for JsonlEventSource {
    async fn fetch_raw_records(&self) -> ReconResult<RawBatch> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ReconError::unavailable(
                SourceKind::RawEvents,
                format!("{}: {e}", self.path.display()),
            )
        })?;

        let batch = parse_jsonl(&contents);
        if batch.unparseable > 0 {
            tracing::warn!(
                "{} lines in {} were not valid JSON",
                batch.unparseable,
                self.path.display()
            );
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"{"event": {"type": "payment_succeeded"}, "payload": {"Amount": "$10.00"}}

{"event": {"type": "heartbeat"}}
{not json
{"event": {"type": "payment_failed"}
"#;

    #[test]
    fn test_parse_jsonl_counts_bad_lines() {
        let batch = parse_jsonl(LOG);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.unparseable, 2);
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_data.jsonl");
        std::fs::write(&path, LOG).unwrap();

        let batch = JsonlEventSource::new(&path).fetch_raw_records().await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.unparseable, 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonlEventSource::new(dir.path().join("absent.jsonl"));

        let err = source.fetch_raw_records().await.unwrap_err();
        assert!(matches!(
            err,
            ReconError::SourceUnavailable {
                origin: SourceKind::RawEvents,
                ..
            }
        ));
    }
}
