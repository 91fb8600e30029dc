//! Search store provider trait definition.
//!
//! This module defines the client-side contract the exporter needs from the
//! search store: bulk writes, template management, index settings and
//! lifecycle policies.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StoreError;
use crate::types::{BulkResponse, ComponentTemplate, IndexTemplate, LifecyclePolicy, StoredPolicy};

/// Abstracts the underlying search store (OpenSearch, in-memory, etc.).
///
/// Implementations are injected into the schema manager and the exporter's
/// store client, which keeps both testable against an in-memory store.
///
/// All methods return `Result<T, StoreError>`. Implementations must bound
/// every call with a request timeout; none of them may block indefinitely.
#[async_trait]
pub trait SearchStoreProvider: Send + Sync {
    /// Submit a bulk request.
    ///
    /// # Arguments
    ///
    /// * `body` - Newline delimited action/source pairs
    ///
    /// # Returns
    ///
    /// * `Ok(BulkResponse)` - The request was accepted; items may still have failed
    /// * `Err(StoreError)` - The store was unreachable or rejected the request as a whole
    async fn bulk(&self, body: &[u8]) -> Result<BulkResponse, StoreError>;

    /// List component templates whose name matches `name_pattern`.
    ///
    /// A pattern matching nothing yields an empty list, not an error.
    async fn get_component_templates(
        &self,
        name_pattern: &str,
    ) -> Result<Vec<ComponentTemplate>, StoreError>;

    /// Create or replace a component template.
    async fn put_component_template(&self, template: &ComponentTemplate) -> Result<(), StoreError>;

    /// Create or replace an index template.
    async fn put_index_template(&self, template: &IndexTemplate) -> Result<(), StoreError>;

    /// Look up a lifecycle policy by name.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(StoredPolicy))` - The policy exists
    /// * `Ok(None)` - No policy with that name
    /// * `Err(StoreError)` - If the lookup fails
    async fn get_lifecycle_policy(&self, name: &str) -> Result<Option<StoredPolicy>, StoreError>;

    /// Create a lifecycle policy, or update it when `existing` is given.
    async fn put_lifecycle_policy(
        &self,
        policy: &LifecyclePolicy,
        existing: Option<&StoredPolicy>,
    ) -> Result<(), StoreError>;

    /// List the names of open indices matching `pattern`.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Apply `settings` to every index in `indices` in a single request.
    async fn update_index_settings(
        &self,
        indices: &[String],
        settings: &Value,
    ) -> Result<(), StoreError>;

    /// Check if the store is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the store is healthy
    /// * `Ok(false)` - If the store is reachable but unhealthy
    /// * `Err(StoreError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, StoreError>;
}
