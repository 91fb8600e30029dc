//! # Record Exporter Pipeline
//!
//! This crate provides the pipeline that projects a partition's records
//! into the search store.
//!
//! ## Architecture
//!
//! Records flow through the pipeline one at a time:
//!
//! 1. **Filter**: Drops records that are not exported
//! 2. **Sequence**: Assigns each record a per value type sequence number
//! 3. **Bulk**: Buffers the serialized record in a bulk batch
//! 4. **Client**: Flushes the batch to the store, installing templates first
//! 5. **Exporter**: Coordinates the flow and acknowledges flushed positions
//!    through the controller

pub mod bulk;
pub mod client;
pub mod controller;
pub mod errors;
pub mod exporter;
pub mod filter;
pub mod metadata;
pub mod sequence;

pub use client::{BulkConfig, ExporterStoreClient};
pub use controller::ExporterController;
pub use errors::PipelineError;
pub use exporter::{Exporter, ExporterConfig};
pub use filter::{FilterConfig, RecordFilter};
pub use metadata::ExporterMetadata;
pub use sequence::{RecordCounters, RecordSequence};
