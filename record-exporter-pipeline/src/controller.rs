//! Controller interface between the exporter and the log it reads from.

use async_trait::async_trait;

use crate::errors::PipelineError;

/// Persists what the exporter has durably written.
///
/// The position and the metadata are updated together; an implementation
/// must never expose one without the other.
#[async_trait]
pub trait ExporterController: Send + Sync {
    /// Acknowledge every record up to and including `position`, storing
    /// `metadata` with it.
    async fn update_last_exported_position(
        &self,
        position: i64,
        metadata: Vec<u8>,
    ) -> Result<(), PipelineError>;

    /// Metadata stored with the last acknowledged position, `None` on first run.
    async fn read_metadata(&self) -> Result<Option<Vec<u8>>, PipelineError>;

    /// Last acknowledged position, `-1` when nothing was acknowledged yet.
    async fn last_exported_position(&self) -> Result<i64, PipelineError>;
}
