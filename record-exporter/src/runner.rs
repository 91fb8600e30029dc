//! Drives records from a source through the exporter.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::source::RecordSource;
use crate::ExporterError;
use record_exporter_pipeline::{Exporter, PipelineError};
use record_exporter_shared::Record;

/// Backoff between deliveries of a record the exporter failed on.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records_read: u64,
    /// Records at or below the position acknowledged by an earlier run.
    pub records_skipped: u64,
    pub records_exported: u64,
    pub records_filtered: u64,
    /// Deliveries repeated after a failure.
    pub redeliveries: u64,
    pub last_committed_position: i64,
    /// The run stopped on the shutdown signal rather than at end of input.
    pub interrupted: bool,
}

enum Delivery {
    Exported,
    Filtered,
    Interrupted,
}

/// Feeds the records of one source to one exporter.
///
/// A record the exporter fails on is delivered again, with exponential
/// backoff, until it succeeds or the run is shut down. Records are never
/// skipped.
pub struct ExportRunner {
    exporter: Exporter,
    source: Box<dyn RecordSource>,
    config: RunnerConfig,
}

impl ExportRunner {
    pub fn new(exporter: Exporter, source: Box<dyn RecordSource>, config: RunnerConfig) -> Self {
        Self {
            exporter,
            source,
            config,
        }
    }

    /// Run until the source is exhausted or `shutdown` completes, then close
    /// the exporter.
    #[instrument(skip(self, shutdown))]
    pub async fn run<S>(mut self, shutdown: S) -> Result<RunSummary, ExporterError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.exporter.open().await?;
        let mut summary = RunSummary::default();

        let result = self.export_all(&mut shutdown, &mut summary).await;
        if let Err(e) = &result {
            error!(error = %e, "Export stopped");
        }

        let closed = self.exporter.close().await;
        summary.last_committed_position = self.exporter.last_committed_position().await;

        info!(
            read = summary.records_read,
            skipped = summary.records_skipped,
            exported = summary.records_exported,
            filtered = summary.records_filtered,
            redeliveries = summary.redeliveries,
            position = summary.last_committed_position,
            interrupted = summary.interrupted,
            "Export run finished"
        );

        result?;
        closed?;
        Ok(summary)
    }

    async fn export_all<S>(
        &mut self,
        shutdown: &mut std::pin::Pin<&mut S>,
        summary: &mut RunSummary,
    ) -> Result<(), ExporterError>
    where
        S: Future<Output = ()>,
    {
        let acknowledged = self.exporter.last_committed_position().await;
        info!(position = acknowledged, "Resuming after acknowledged position");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.as_mut() => {
                    info!("Shutdown requested");
                    summary.interrupted = true;
                    return Ok(());
                }
                next = self.source.next_record() => next?,
            };

            let Some(record) = next else {
                break;
            };
            summary.records_read += 1;

            if record.position <= acknowledged {
                summary.records_skipped += 1;
                continue;
            }

            match self.deliver(&record, shutdown, summary).await? {
                Delivery::Exported => summary.records_exported += 1,
                Delivery::Filtered => summary.records_filtered += 1,
                Delivery::Interrupted => {
                    summary.interrupted = true;
                    return Ok(());
                }
            }
        }

        debug!("End of input, flushing remaining records");
        if !self.flush_remaining(shutdown, summary).await? {
            summary.interrupted = true;
        }
        Ok(())
    }

    /// Export `record`, delivering it again until it is accepted.
    async fn deliver<S>(
        &self,
        record: &Record,
        shutdown: &mut std::pin::Pin<&mut S>,
        summary: &mut RunSummary,
    ) -> Result<Delivery, ExporterError>
    where
        S: Future<Output = ()>,
    {
        let mut backoff = self.config.initial_backoff;

        loop {
            match self.exporter.export(record).await {
                Ok(true) => return Ok(Delivery::Exported),
                Ok(false) => return Ok(Delivery::Filtered),
                Err(e) if is_retryable(&e) => {
                    warn!(
                        position = record.position,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Export failed, delivering record again"
                    );
                    if !self.wait(backoff, shutdown).await {
                        return Ok(Delivery::Interrupted);
                    }
                    summary.redeliveries += 1;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Flush until it succeeds. Returns `false` if shut down first.
    async fn flush_remaining<S>(
        &self,
        shutdown: &mut std::pin::Pin<&mut S>,
        summary: &mut RunSummary,
    ) -> Result<bool, ExporterError>
    where
        S: Future<Output = ()>,
    {
        let mut backoff = self.config.initial_backoff;

        loop {
            match self.exporter.flush().await {
                Ok(()) => return Ok(true),
                Err(e) if is_retryable(&e) => {
                    warn!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Flush failed, retrying"
                    );
                    if !self.wait(backoff, shutdown).await {
                        return Ok(false);
                    }
                    summary.redeliveries += 1;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sleep for `duration`. Returns `false` if shut down first.
    async fn wait<S>(&self, duration: Duration, shutdown: &mut std::pin::Pin<&mut S>) -> bool
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown.as_mut() => {
                info!("Shutdown requested while waiting to retry");
                false
            }
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Store and controller failures go away on their own; anything else would
/// fail the same way on every delivery.
fn is_retryable(error: &PipelineError) -> bool {
    matches!(
        error,
        PipelineError::StoreError(_) | PipelineError::ControllerError(_)
    )
}
