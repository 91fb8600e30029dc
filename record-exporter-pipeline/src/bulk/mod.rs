//! Bulk request building.

mod batch;
pub mod compat;

pub use batch::{BulkBatch, BulkOperation, BulkTarget};
