//! Store client of the exporter.
//!
//! Owns the bulk batch, decides when to flush it and delivers it to the
//! search store, installing the schema for new value types on the way.

mod router;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::bulk::BulkBatch;
use crate::errors::PipelineError;
use crate::sequence::RecordSequence;
use record_exporter_repository::{BulkResponse, SchemaManager, SearchStoreProvider, StoreError};
use record_exporter_shared::{Record, ValueType};

pub use router::IndexRouter;

/// Thresholds and retry behaviour of bulk delivery.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Flush once this many operations are buffered.
    pub size: usize,
    /// Flush once the buffered documents take this many bytes.
    pub memory_limit: usize,
    /// Flush once this much time passed since the last flush.
    pub delay: Duration,
    /// Retries of a bulk request failing with a transient error.
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            memory_limit: 10 * 1024 * 1024,
            delay: Duration::from_secs(5),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Buffers records and writes them to the store in bulk.
pub struct ExporterStoreClient {
    provider: Arc<dyn SearchStoreProvider>,
    schema: SchemaManager,
    router: IndexRouter,
    config: BulkConfig,
    create_templates: bool,
    batch: BulkBatch,
    /// Value types in the batch whose index template is not installed yet.
    pending_value_types: BTreeSet<ValueType>,
    installed_value_types: HashSet<ValueType>,
    schema_created: bool,
    last_flush: Instant,
}

impl ExporterStoreClient {
    pub fn new(
        provider: Arc<dyn SearchStoreProvider>,
        schema: SchemaManager,
        config: BulkConfig,
        create_templates: bool,
    ) -> Self {
        let router = IndexRouter::new(schema.index_config().clone(), schema.version().clone());
        Self {
            provider,
            schema,
            router,
            config,
            create_templates,
            batch: BulkBatch::new(),
            pending_value_types: BTreeSet::new(),
            installed_value_types: HashSet::new(),
            schema_created: false,
            last_flush: Instant::now(),
        }
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    pub fn batch(&self) -> &BulkBatch {
        &self.batch
    }

    /// Add `record` to the batch.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was buffered
    /// * `Ok(false)` - The record repeats the last buffered target
    /// * `Err(PipelineError)` - If the record cannot be routed or serialized
    pub fn index(&mut self, record: &Record, sequence: RecordSequence) -> Result<bool, PipelineError> {
        let target = self.router.target(record)?;
        let appended = self.batch.add(target, record, sequence)?;

        if appended && !self.installed_value_types.contains(&record.value_type) {
            self.pending_value_types.insert(record.value_type);
        }
        Ok(appended)
    }

    /// Whether the batch reached the size, memory or time threshold.
    pub fn should_flush(&self) -> bool {
        !self.batch.is_empty()
            && (self.batch.size() >= self.config.size
                || self.batch.memory_usage_bytes() >= self.config.memory_limit
                || self.last_flush.elapsed() >= self.config.delay)
    }

    /// Deliver the batch.
    ///
    /// On error the batch is kept as is so the same operations can be
    /// delivered again.
    #[instrument(skip(self), fields(count = self.batch.size()))]
    pub async fn flush(&mut self) -> Result<(), PipelineError> {
        if self.batch.is_empty() {
            self.last_flush = Instant::now();
            return Ok(());
        }

        self.ensure_schema().await?;

        let body = self.batch.to_bytes()?;
        let response = self.bulk_with_retry(&body).await?;

        if response.has_failures() {
            let first = &response.failures[0];
            error!(
                failed = response.failures.len(),
                total = response.item_count,
                id = %first.id,
                index = %first.index,
                error_type = %first.error_type,
                reason = %first.reason,
                "Bulk request had failed items"
            );
            return Err(StoreError::BulkItemsFailed {
                failed: response.failures.len(),
                total: response.item_count,
                first_failure: format!(
                    "{} in {}: {}: {}",
                    first.id, first.index, first.error_type, first.reason
                ),
            }
            .into());
        }

        debug!(
            count = self.batch.size(),
            bytes = body.len(),
            took_ms = response.took_ms,
            "Flushed bulk batch"
        );
        self.batch.clear();
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Install the schema for value types seen for the first time.
    async fn ensure_schema(&mut self) -> Result<(), PipelineError> {
        if self.pending_value_types.is_empty() {
            return Ok(());
        }
        if !self.create_templates {
            self.installed_value_types
                .extend(std::mem::take(&mut self.pending_value_types));
            return Ok(());
        }

        let value_types: Vec<ValueType> = self.pending_value_types.iter().copied().collect();
        if self.schema_created {
            for value_type in &value_types {
                self.schema.create_index_template(*value_type).await?;
            }
        } else {
            self.schema.create_schema(&value_types).await?;
            self.schema_created = true;

            // Retention on older indices does not block delivery
            if let Err(e) = self.schema.update_lifecycle_on_existing_indices().await {
                warn!(error = %e, "Failed to update lifecycle policy on existing indices");
            }
        }

        self.installed_value_types.extend(value_types);
        self.pending_value_types.clear();
        Ok(())
    }

    /// Submit a bulk request with exponential backoff retry of transient errors.
    async fn bulk_with_retry(&self, body: &[u8]) -> Result<BulkResponse, StoreError> {
        let mut delay = self.config.initial_retry_delay;
        let mut last_error: Option<StoreError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.provider.bulk(body).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(attempt = attempt, "Bulk request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if !Self::is_retryable_error(&e) {
                        debug!(error = %e, "Non-retryable error encountered");
                        return Err(e);
                    }

                    // Don't wait after the last attempt
                    if attempt < self.config.max_retries {
                        warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Bulk request failed, retrying"
                        );

                        tokio::time::sleep(delay).await;
                        delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StoreError::connection("Unknown error after retries")))
    }

    /// Determine if an error is retryable (transient failures).
    fn is_retryable_error(error: &StoreError) -> bool {
        match error {
            StoreError::ConnectionError(_) => true,
            StoreError::RequestRejected { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_exporter_repository::testing::InMemoryStoreProvider;
    use record_exporter_repository::{IndexConfig, RetentionConfig};
    use record_exporter_shared::{RecordType, SemanticVersion};
    use serde_json::json;

    // 2024-06-10T13:45:00Z
    const TIMESTAMP: i64 = 1_718_027_100_000;

    fn client_with(
        store: &Arc<InMemoryStoreProvider>,
        config: BulkConfig,
        create_templates: bool,
    ) -> ExporterStoreClient {
        let schema = SchemaManager::new(
            store.clone(),
            IndexConfig::with_prefix("record"),
            RetentionConfig::default(),
            SemanticVersion::new(8, 6, 0),
        );
        ExporterStoreClient::new(store.clone(), schema, config, create_templates)
    }

    fn record(value_type: ValueType, position: i64) -> Record {
        Record::new(1, position, value_type, RecordType::Event, "8.6.0")
            .with_timestamp(TIMESTAMP)
            .with_value(json!({ "position": position }))
    }

    #[tokio::test]
    async fn test_flush_writes_documents_and_installs_schema() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let mut client = client_with(&store, BulkConfig::default(), true);

        assert!(client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap());
        assert!(client.index(&record(ValueType::Timer, 2), RecordSequence::new(1, 1)).unwrap());
        client.flush().await.unwrap();

        assert!(client.batch().is_empty());
        let state = store.state().await;
        let job = state.document("record-job-8.6.0_2024-06-10", "1-1").unwrap();
        assert_eq!(job.routing.as_deref(), Some("1"));
        assert_eq!(job.source["sequence"], (1_i64 << 51) | 1);
        assert!(state.document("record-timer-8.6.0_2024-06-10", "1-2").is_some());
        assert_eq!(state.component_template_puts, 1);
        assert!(state.index_templates.contains_key("record-job-8.6.0"));
        assert!(state.index_templates.contains_key("record-timer-8.6.0"));
    }

    #[tokio::test]
    async fn test_templates_installed_once_per_value_type() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let mut client = client_with(&store, BulkConfig::default(), true);

        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        client.flush().await.unwrap();
        client.index(&record(ValueType::Job, 2), RecordSequence::new(1, 2)).unwrap();
        client.index(&record(ValueType::Variable, 3), RecordSequence::new(1, 1)).unwrap();
        client.flush().await.unwrap();

        let state = store.state().await;
        assert_eq!(state.component_template_puts, 1);
        assert_eq!(state.index_template_puts, 2);
    }

    #[tokio::test]
    async fn test_template_creation_disabled() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let mut client = client_with(&store, BulkConfig::default(), false);

        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        client.flush().await.unwrap();

        let state = store.state().await;
        assert!(state.component_templates.is_empty());
        assert!(state.index_templates.is_empty());
        assert_eq!(state.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_should_flush_on_size() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let config = BulkConfig {
            size: 2,
            ..BulkConfig::default()
        };
        let mut client = client_with(&store, config, true);

        assert!(!client.should_flush());
        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        assert!(!client.should_flush());
        client.index(&record(ValueType::Job, 2), RecordSequence::new(1, 2)).unwrap();
        assert!(client.should_flush());
    }

    #[tokio::test]
    async fn test_should_flush_on_memory() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let config = BulkConfig {
            memory_limit: 10,
            ..BulkConfig::default()
        };
        let mut client = client_with(&store, config, true);

        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        assert!(client.should_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_flush_on_delay() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let mut client = client_with(&store, BulkConfig::default(), true);

        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        assert!(!client.should_flush());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(client.should_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let store = Arc::new(InMemoryStoreProvider::new());
        store.fail_next_bulk(2).await;
        let mut client = client_with(&store, BulkConfig::default(), true);

        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        client.flush().await.unwrap();

        let state = store.state().await;
        assert_eq!(state.bulk_requests, 3);
        assert_eq!(state.documents.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_keeps_batch() {
        let store = Arc::new(InMemoryStoreProvider::new());
        store.fail_next_bulk(10).await;
        let config = BulkConfig {
            max_retries: 2,
            ..BulkConfig::default()
        };
        let mut client = client_with(&store, config, true);

        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        let result = client.flush().await;

        assert!(matches!(
            result,
            Err(PipelineError::StoreError(StoreError::RequestRejected { status: 503, .. }))
        ));
        assert_eq!(client.batch().size(), 1);
        assert_eq!(store.state().await.bulk_requests, 3);
    }

    #[tokio::test]
    async fn test_item_failures_fail_the_flush() {
        let store = Arc::new(InMemoryStoreProvider::new());
        store.reject_document("1-2").await;
        let mut client = client_with(&store, BulkConfig::default(), true);

        client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap();
        client.index(&record(ValueType::Job, 2), RecordSequence::new(1, 2)).unwrap();
        let result = client.flush().await;

        assert!(matches!(
            result,
            Err(PipelineError::StoreError(StoreError::BulkItemsFailed {
                failed: 1,
                total: 2,
                ..
            }))
        ));
        assert_eq!(client.batch().size(), 2);
        // Item failures are not retried
        assert_eq!(store.state().await.bulk_requests, 1);
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(ExporterStoreClient::is_retryable_error(&StoreError::connection("reset")));
        assert!(ExporterStoreClient::is_retryable_error(&StoreError::rejected(429, "")));
        assert!(ExporterStoreClient::is_retryable_error(&StoreError::rejected(504, "")));
        assert!(!ExporterStoreClient::is_retryable_error(&StoreError::rejected(400, "")));
        assert!(!ExporterStoreClient::is_retryable_error(&StoreError::parse("bad")));
    }

    #[tokio::test]
    async fn test_repeated_record_is_not_buffered_twice() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let mut client = client_with(&store, BulkConfig::default(), true);

        assert!(client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 1)).unwrap());
        assert!(!client.index(&record(ValueType::Job, 1), RecordSequence::new(1, 2)).unwrap());
        assert_eq!(client.batch().size(), 1);
    }
}
