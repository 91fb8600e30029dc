//! OpenSearch implementation of the search store provider.

mod client;

pub use client::OpenSearchClient;
