//! Error types for the record exporter repository.

mod store_error;

pub use store_error::StoreError;
