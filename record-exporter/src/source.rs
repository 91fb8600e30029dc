//! Sources of records to export.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::info;

use crate::ExporterError;
use record_exporter_shared::Record;

/// Delivers records in position order.
#[async_trait]
pub trait RecordSource: Send {
    /// Next record, `None` at the end of the input.
    async fn next_record(&mut self) -> Result<Option<Record>, ExporterError>;
}

/// Reads one JSON record per line. Blank lines are skipped.
pub struct NdjsonRecordSource<R> {
    lines: Lines<R>,
    line_number: usize,
}

impl NdjsonRecordSource<BufReader<File>> {
    pub async fn open(path: &Path) -> Result<Self, ExporterError> {
        let file = File::open(path).await.map_err(|e| {
            ExporterError::config(format!(
                "Failed to open records file {}: {}",
                path.display(),
                e
            ))
        })?;
        info!(path = %path.display(), "Reading records");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R> NdjsonRecordSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }

    /// Line number of the last line read, starting at 1.
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

#[async_trait]
impl<R> RecordSource for NdjsonRecordSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_record(&mut self) -> Result<Option<Record>, ExporterError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| ExporterError::InvalidRecord {
                    line: self.line_number,
                    reason: e.to_string(),
                });
        }
        Ok(None)
    }
}
