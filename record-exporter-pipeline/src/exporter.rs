//! The record exporter.
//!
//! Filters and sequences records, hands them to the store client and, after
//! every successful flush, acknowledges the flushed position together with
//! the record counters through the controller.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::client::ExporterStoreClient;
use crate::controller::ExporterController;
use crate::errors::PipelineError;
use crate::filter::{FilterConfig, RecordFilter};
use crate::metadata::ExporterMetadata;
use crate::sequence::RecordCounters;
use record_exporter_shared::Record;

/// Configuration of the exporter.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Partition whose records this exporter receives.
    pub partition_id: i32,
    pub filter: FilterConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            partition_id: 1,
            filter: FilterConfig::default(),
        }
    }
}

/// Everything a flush touches, guarded by one lock so the periodic flush
/// never interleaves with `export`.
struct ExporterState {
    client: ExporterStoreClient,
    counters: RecordCounters,
    /// Highest position handled but not yet flushed.
    pending_position: Option<i64>,
    /// Highest position flushed to the store but not yet acknowledged.
    flushed_position: Option<i64>,
    last_committed_position: i64,
    open: bool,
}

impl ExporterState {
    /// Flush the batch and acknowledge the pending position.
    async fn flush_and_commit(
        &mut self,
        controller: &dyn ExporterController,
    ) -> Result<(), PipelineError> {
        self.client.flush().await?;

        if let Some(position) = self.pending_position.take() {
            self.flushed_position =
                Some(self.flushed_position.map_or(position, |p| p.max(position)));
        }
        self.commit_flushed(controller).await
    }

    /// Acknowledge what was flushed but not acknowledged yet.
    async fn commit_flushed(
        &mut self,
        controller: &dyn ExporterController,
    ) -> Result<(), PipelineError> {
        if let Some(position) = self.flushed_position {
            self.commit(position, controller).await?;
            self.flushed_position = None;
        }
        Ok(())
    }

    /// Whether `position` is already in the store and only waits for its
    /// acknowledgement.
    fn is_flushed(&self, position: i64) -> bool {
        self.flushed_position.is_some_and(|flushed| position <= flushed)
    }

    async fn commit(
        &mut self,
        position: i64,
        controller: &dyn ExporterController,
    ) -> Result<(), PipelineError> {
        if position <= self.last_committed_position {
            debug!(
                position,
                last_committed = self.last_committed_position,
                "Position already acknowledged"
            );
            return Ok(());
        }

        let metadata = self.counters.to_metadata().to_bytes()?;
        controller
            .update_last_exported_position(position, metadata)
            .await?;
        self.last_committed_position = position;
        debug!(position, "Acknowledged exported position");
        Ok(())
    }

    fn remember_position(&mut self, position: i64) {
        self.pending_position = Some(self.pending_position.map_or(position, |p| p.max(position)));
    }
}

/// Exports the records of one partition.
///
/// Lifecycle: `open` restores the counters and starts the periodic flush,
/// `export` is called for every record in position order, `close` stops the
/// periodic flush and flushes what is left.
pub struct Exporter {
    state: Arc<Mutex<ExporterState>>,
    filter: RecordFilter,
    controller: Arc<dyn ExporterController>,
    shutdown_tx: broadcast::Sender<()>,
    flush_task: Option<JoinHandle<()>>,
}

impl Exporter {
    pub fn new(
        config: ExporterConfig,
        client: ExporterStoreClient,
        controller: Arc<dyn ExporterController>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            state: Arc::new(Mutex::new(ExporterState {
                client,
                counters: RecordCounters::new(config.partition_id),
                pending_position: None,
                flushed_position: None,
                last_committed_position: -1,
                open: false,
            })),
            filter: RecordFilter::new(config.filter),
            controller,
            shutdown_tx,
            flush_task: None,
        }
    }

    /// Restore counters and the acknowledged position, then start the
    /// periodic flush.
    #[instrument(skip(self))]
    pub async fn open(&mut self) -> Result<(), PipelineError> {
        let delay = {
            let mut state = self.state.lock().await;
            if state.open {
                return Ok(());
            }

            if let Some(bytes) = self.controller.read_metadata().await? {
                let metadata = ExporterMetadata::from_bytes(&bytes)?;
                state.counters.restore(&metadata);
            }
            state.last_committed_position = self.controller.last_exported_position().await?;
            state.open = true;

            info!(
                position = state.last_committed_position,
                "Exporter opened"
            );
            state.client.config().delay
        };

        let state = self.state.clone();
        let controller = self.controller.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.flush_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(delay);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let mut state = state.lock().await;
                        if !state.open {
                            break;
                        }
                        if let Err(e) = state.flush_and_commit(controller.as_ref()).await {
                            warn!(error = %e, "Scheduled flush failed, retrying on next tick");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Periodic flush stopped");
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    /// Export one record.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was buffered, and flushed if a threshold was reached
    /// * `Ok(false)` - The record was filtered out
    /// * `Err(PipelineError)` - Nothing was acknowledged; the record must be
    ///   delivered again
    #[instrument(skip(self, record), fields(position = record.position, value_type = %record.value_type))]
    pub async fn export(&self, record: &Record) -> Result<bool, PipelineError> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(PipelineError::Closed);
        }

        let accepted = self.filter.accepts(record);

        // Delivered again after its acknowledgement failed
        if state.is_flushed(record.position) {
            debug!("Record already flushed, acknowledging again");
            state.commit_flushed(self.controller.as_ref()).await?;
            return Ok(accepted);
        }

        if !accepted {
            debug!("Record filtered out");
            state.remember_position(record.position);
            if state.client.batch().is_empty() {
                state.flush_and_commit(self.controller.as_ref()).await?;
            }
            return Ok(false);
        }

        let sequence = state.counters.next(record.value_type)?;
        match state.client.index(record, sequence) {
            Ok(true) => {}
            Ok(false) => state.counters.rollback(record.value_type),
            Err(e) => {
                state.counters.rollback(record.value_type);
                return Err(e);
            }
        }
        state.remember_position(record.position);

        if state.client.should_flush() {
            state.flush_and_commit(self.controller.as_ref()).await?;
        }
        Ok(true)
    }

    /// Flush buffered records now and acknowledge them.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(PipelineError::Closed);
        }
        state.flush_and_commit(self.controller.as_ref()).await
    }

    /// Stop the periodic flush and flush what is left.
    #[instrument(skip(self))]
    pub async fn close(&mut self) -> Result<(), PipelineError> {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.flush_task.take() {
            let _ = task.await;
        }

        let mut state = self.state.lock().await;
        if !state.open {
            return Ok(());
        }
        state.open = false;

        let result = state.flush_and_commit(self.controller.as_ref()).await;
        match &result {
            Ok(()) => info!(
                position = state.last_committed_position,
                "Exporter closed"
            ),
            Err(e) => warn!(error = %e, "Final flush failed while closing exporter"),
        }
        result
    }

    /// Last position acknowledged through the controller.
    pub async fn last_committed_position(&self) -> i64 {
        self.state.lock().await.last_committed_position
    }

    /// Current in-memory counters, including those not acknowledged yet.
    pub async fn counters(&self) -> ExporterMetadata {
        self.state.lock().await.counters.to_metadata()
    }
}
