//! Error types for the record export pipeline.

use record_exporter_repository::StoreError;
use record_exporter_shared::ValueType;
use thiserror::Error;

/// Errors that can occur while exporting records.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error from the search store.
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// A record could not be serialized into a bulk operation.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Persisted exporter metadata could not be read or written.
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// The controller failed to persist or return the exporter state.
    #[error("Controller error: {0}")]
    ControllerError(String),

    /// The counter of a value type no longer fits into a record sequence.
    #[error("Record counter of {value_type} overflowed at {counter}")]
    SequenceOverflow { value_type: ValueType, counter: i64 },

    /// The exporter is not open.
    #[error("Exporter is closed")]
    Closed,
}

impl PipelineError {
    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a metadata error.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::MetadataError(msg.into())
    }

    /// Create a controller error.
    pub fn controller(msg: impl Into<String>) -> Self {
        Self::ControllerError(msg.into())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
