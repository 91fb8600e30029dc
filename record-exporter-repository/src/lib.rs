//! # Record Exporter Repository
//!
//! This crate provides the search store contract used by the exporter, an
//! OpenSearch implementation of it, and the schema management built on top:
//! component and index templates, and the retention policy.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod schema;
pub mod templates;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{IndexConfig, RetentionConfig};
pub use errors::StoreError;
pub use interfaces::SearchStoreProvider;
pub use opensearch::OpenSearchClient;
pub use schema::SchemaManager;
pub use types::{BulkItemFailure, BulkResponse};
