//! Dependency initialization and wiring for the record exporter.

use std::sync::Arc;
use tracing::info;

use super::Settings;
use crate::controller::FileController;
use crate::runner::{ExportRunner, RunnerConfig};
use crate::source::NdjsonRecordSource;
use crate::ExporterError;
use record_exporter_pipeline::{Exporter, ExporterStoreClient};
use record_exporter_repository::{OpenSearchClient, SchemaManager, SearchStoreProvider};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured runner ready to run.
    pub runner: ExportRunner,
}

impl Dependencies {
    /// Initialize all dependencies from validated settings.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(ExporterError)` - If initialization fails
    pub async fn new(settings: Settings) -> Result<Self, ExporterError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            partition_id = settings.exporter.partition_id,
            schema_version = %settings.schema_version,
            prefix = %settings.index.prefix,
            records = %settings.records_path.display(),
            state = %settings.state_path.display(),
            "Initializing dependencies"
        );

        // Initialize OpenSearch client
        let search_client =
            OpenSearchClient::new(&settings.opensearch_url, settings.request_timeout)
                .await
                .map_err(|e| {
                    ExporterError::config(format!("Failed to create OpenSearch client: {}", e))
                })?;

        // Verify OpenSearch is reachable
        let healthy = search_client
            .health_check()
            .await
            .map_err(|e| ExporterError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(ExporterError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let provider: Arc<dyn SearchStoreProvider> = Arc::new(search_client);
        let schema = SchemaManager::new(
            provider.clone(),
            settings.index,
            settings.retention,
            settings.schema_version,
        );
        let client =
            ExporterStoreClient::new(provider, schema, settings.bulk, settings.create_templates);

        let controller = FileController::open(settings.state_path).await?;
        let exporter = Exporter::new(settings.exporter, client, Arc::new(controller));

        let source = NdjsonRecordSource::open(&settings.records_path).await?;

        let runner = ExportRunner::new(exporter, Box::new(source), RunnerConfig::default());

        Ok(Self { runner })
    }
}
