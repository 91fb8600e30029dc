//! # Record Exporter
//!
//! Main library for the record exporter.
//!
//! This crate provides the configuration, the file backed controller and
//! record source, and the runner that drive the export pipeline.

pub mod config;
pub mod controller;
pub mod runner;
pub mod source;

pub use config::{Dependencies, Settings};
pub use controller::FileController;
pub use runner::{ExportRunner, RunSummary, RunnerConfig};
pub use source::{NdjsonRecordSource, RecordSource};

use thiserror::Error;

/// Errors that can occur during exporter initialization or execution.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] record_exporter_pipeline::PipelineError),

    /// Store error.
    #[error("Store error: {0}")]
    StoreError(#[from] record_exporter_repository::StoreError),

    /// A record line could not be parsed.
    #[error("Invalid record on line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ExporterError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
