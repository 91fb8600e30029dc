//! File backed exporter controller.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::ExporterError;
use record_exporter_pipeline::{ExporterController, PipelineError};

/// Acknowledged state as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ControllerState {
    position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            position: -1,
            metadata: None,
        }
    }
}

/// Keeps the acknowledged position and the exporter metadata in one JSON
/// file.
///
/// Every update writes a temporary file next to the state file and renames
/// it over the old one, so a crash leaves either the previous or the new
/// state, never a mix.
pub struct FileController {
    path: PathBuf,
    state: Mutex<ControllerState>,
}

impl FileController {
    /// Load the state at `path`, starting from scratch if the file does not
    /// exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ExporterError> {
        let path = path.into();

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<ControllerState>(&bytes).map_err(|e| {
                ExporterError::config(format!(
                    "Corrupt exporter state file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No exporter state found, starting from the beginning");
                ControllerState::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            position = state.position,
            "Loaded exporter state"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp: OsString = self.path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    async fn write(&self, state: &ControllerState) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let temp = self.temp_path();

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await
    }
}

#[async_trait]
impl ExporterController for FileController {
    async fn update_last_exported_position(
        &self,
        position: i64,
        metadata: Vec<u8>,
    ) -> Result<(), PipelineError> {
        let metadata: Value = serde_json::from_slice(&metadata)
            .map_err(|e| PipelineError::controller(format!("Metadata is not JSON: {}", e)))?;

        let mut state = self.state.lock().await;
        let next = ControllerState {
            position,
            metadata: Some(metadata),
        };

        self.write(&next).await.map_err(|e| {
            PipelineError::controller(format!(
                "Failed to write exporter state {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(position, "Exporter state written");
        *state = next;
        Ok(())
    }

    async fn read_metadata(&self) -> Result<Option<Vec<u8>>, PipelineError> {
        let state = self.state.lock().await;
        state
            .metadata
            .as_ref()
            .map(|metadata| serde_json::to_vec(metadata).map_err(PipelineError::from))
            .transpose()
    }

    async fn last_exported_position(&self) -> Result<i64, PipelineError> {
        Ok(self.state.lock().await.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_exporter_pipeline::ExporterMetadata;
    use record_exporter_shared::ValueType;

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("exporter-state-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_file_starts_fresh() {
        let path = temp_state_path();
        let controller = FileController::open(&path).await.unwrap();

        assert_eq!(controller.last_exported_position().await.unwrap(), -1);
        assert!(controller.read_metadata().await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_update_survives_reopen() {
        let path = temp_state_path();
        let metadata = ExporterMetadata::new()
            .with_counter(ValueType::Job, 7)
            .with_counter(ValueType::ProcessInstance, 12);

        {
            let controller = FileController::open(&path).await.unwrap();
            controller
                .update_last_exported_position(42, metadata.to_bytes().unwrap())
                .await
                .unwrap();
            assert_eq!(controller.last_exported_position().await.unwrap(), 42);
        }

        let reopened = FileController::open(&path).await.unwrap();
        assert_eq!(reopened.last_exported_position().await.unwrap(), 42);

        let bytes = reopened.read_metadata().await.unwrap().unwrap();
        let restored = ExporterMetadata::from_bytes(&bytes).unwrap();
        assert_eq!(restored, metadata);

        assert!(!reopened.temp_path().exists());
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_state_file_format() {
        let path = temp_state_path();
        let controller = FileController::open(&path).await.unwrap();
        let metadata = ExporterMetadata::new().with_counter(ValueType::Job, 3);

        controller
            .update_last_exported_position(9, metadata.to_bytes().unwrap())
            .await
            .unwrap();

        let stored: Value = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(stored["position"], 9);
        assert_eq!(stored["metadata"]["recordCountersByValueType"]["JOB"], 3);
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let path = temp_state_path();
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let result = FileController::open(&path).await;
        assert!(matches!(result, Err(ExporterError::ConfigError(_))));
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_state() {
        let dir = std::env::temp_dir().join(format!("exporter-missing-{}", uuid::Uuid::new_v4()));
        let controller = FileController::open(dir.join("state.json")).await.unwrap();

        let result = controller
            .update_last_exported_position(5, b"{}".to_vec())
            .await;

        assert!(matches!(result, Err(PipelineError::ControllerError(_))));
        assert_eq!(controller.last_exported_position().await.unwrap(), -1);
    }
}
