//! In-memory search store for tests.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! the tests of dependent crates.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Mutex, MutexGuard};

use crate::errors::StoreError;
use crate::interfaces::SearchStoreProvider;
use crate::types::{
    BulkItemFailure, BulkResponse, ComponentTemplate, IndexTemplate, LifecyclePolicy, StoredPolicy,
};

/// A document as indexed by a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub routing: Option<String>,
    pub source: Value,
}

/// Everything the in-memory store has received.
#[derive(Debug, Default)]
pub struct StoreState {
    /// Number of bulk requests that reached the store, failed ones included.
    pub bulk_requests: usize,
    /// Indexed documents keyed by `(index, id)`.
    pub documents: BTreeMap<(String, String), StoredDocument>,
    pub component_templates: BTreeMap<String, ComponentTemplate>,
    pub index_templates: BTreeMap<String, IndexTemplate>,
    pub policies: BTreeMap<String, (LifecyclePolicy, StoredPolicy)>,
    pub indices: BTreeSet<String>,
    pub settings_updates: Vec<(Vec<String>, Value)>,
    pub component_template_puts: usize,
    pub index_template_puts: usize,
    pub policy_puts: usize,
    fail_next_bulk: usize,
    rejected_ids: HashSet<String>,
    unavailable: bool,
}

impl StoreState {
    /// Documents stored in `index`, ordered by id.
    pub fn documents_in(&self, index: &str) -> Vec<(&str, &StoredDocument)> {
        self.documents
            .iter()
            .filter(|((doc_index, _), _)| doc_index == index)
            .map(|((_, id), document)| (id.as_str(), document))
            .collect()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<&StoredDocument> {
        self.documents.get(&(index.to_string(), id.to_string()))
    }
}

/// A `SearchStoreProvider` keeping everything in memory.
#[derive(Default)]
pub struct InMemoryStoreProvider {
    state: Mutex<StoreState>,
}

impl InMemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the store.
    pub async fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().await
    }

    /// Answer the next `count` bulk requests with a 503.
    pub async fn fail_next_bulk(&self, count: usize) {
        self.state.lock().await.fail_next_bulk = count;
    }

    /// Fail every bulk item with this document id.
    pub async fn reject_document(&self, id: impl Into<String>) {
        self.state.lock().await.rejected_ids.insert(id.into());
    }

    /// Make every call fail with a connection error.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn add_index(&self, name: impl Into<String>) {
        self.state.lock().await.indices.insert(name.into());
    }

    /// Store a component template as if another exporter had created it.
    pub async fn insert_component_template(&self, template: ComponentTemplate) {
        self.state
            .lock()
            .await
            .component_templates
            .insert(template.name.clone(), template);
    }

    async fn available(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(StoreError::connection("connection refused"));
        }
        Ok(state)
    }
}

/// Glob matching supporting a trailing `*`.
fn matches_pattern(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

#[async_trait]
impl SearchStoreProvider for InMemoryStoreProvider {
    async fn bulk(&self, body: &[u8]) -> Result<BulkResponse, StoreError> {
        let mut state = self.available().await?;
        state.bulk_requests += 1;

        if state.fail_next_bulk > 0 {
            state.fail_next_bulk -= 1;
            return Err(StoreError::rejected(503, "service unavailable"));
        }

        let mut lines = body
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty());
        let mut items = Vec::new();
        let mut failures = Vec::new();

        while let Some(action_line) = lines.next() {
            let action: Value = serde_json::from_slice(action_line)
                .map_err(|e| StoreError::rejected(400, e.to_string()))?;
            let source_line = lines
                .next()
                .ok_or_else(|| StoreError::rejected(400, "action without source"))?;
            let source: Value = serde_json::from_slice(source_line)
                .map_err(|e| StoreError::rejected(400, e.to_string()))?;

            let meta = &action["index"];
            let index = meta["_index"].as_str().unwrap_or_default().to_string();
            let id = meta["_id"].as_str().unwrap_or_default().to_string();
            items.push(json!({ "index": { "_index": index, "_id": id } }));

            if state.rejected_ids.contains(&id) {
                failures.push(BulkItemFailure {
                    index,
                    id,
                    status: 400,
                    error_type: "mapper_parsing_exception".to_string(),
                    reason: "rejected by test store".to_string(),
                });
                continue;
            }

            let routing = meta["routing"].as_str().map(str::to_string);
            state.indices.insert(index.clone());
            state
                .documents
                .insert((index, id), StoredDocument { routing, source });
        }

        Ok(BulkResponse {
            took_ms: 1,
            item_count: items.len(),
            failures,
        })
    }

    async fn get_component_templates(
        &self,
        name_pattern: &str,
    ) -> Result<Vec<ComponentTemplate>, StoreError> {
        let state = self.available().await?;
        Ok(state
            .component_templates
            .values()
            .filter(|template| matches_pattern(name_pattern, &template.name))
            .cloned()
            .collect())
    }

    async fn put_component_template(&self, template: &ComponentTemplate) -> Result<(), StoreError> {
        let mut state = self.available().await?;
        state.component_template_puts += 1;
        state
            .component_templates
            .insert(template.name.clone(), template.clone());
        Ok(())
    }

    async fn put_index_template(&self, template: &IndexTemplate) -> Result<(), StoreError> {
        let mut state = self.available().await?;
        state.index_template_puts += 1;
        state
            .index_templates
            .insert(template.name.clone(), template.clone());
        Ok(())
    }

    async fn get_lifecycle_policy(&self, name: &str) -> Result<Option<StoredPolicy>, StoreError> {
        let state = self.available().await?;
        Ok(state.policies.get(name).map(|(_, stored)| stored.clone()))
    }

    async fn put_lifecycle_policy(
        &self,
        policy: &LifecyclePolicy,
        existing: Option<&StoredPolicy>,
    ) -> Result<(), StoreError> {
        let mut state = self.available().await?;
        let current = state.policies.get(&policy.name).map(|(_, stored)| stored);

        let seq_no = match (current, existing) {
            (None, None) => 0,
            (Some(current), Some(existing)) if current.seq_no == existing.seq_no => {
                current.seq_no + 1
            }
            _ => return Err(StoreError::rejected(409, "version conflict")),
        };

        state.policy_puts += 1;
        state.policies.insert(
            policy.name.clone(),
            (
                policy.clone(),
                StoredPolicy {
                    minimum_age: Some(policy.minimum_age.clone()),
                    seq_no,
                    primary_term: 1,
                },
            ),
        );
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let state = self.available().await?;
        Ok(state
            .indices
            .iter()
            .filter(|index| matches_pattern(pattern, index))
            .cloned()
            .collect())
    }

    async fn update_index_settings(
        &self,
        indices: &[String],
        settings: &Value,
    ) -> Result<(), StoreError> {
        let mut state = self.available().await?;
        state
            .settings_updates
            .push((indices.to_vec(), settings.clone()));
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.available().await.map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("record-*", "record-8.6.0"));
        assert!(matches_pattern("record-8.6.0", "record-8.6.0"));
        assert!(!matches_pattern("record-*", "other-8.6.0"));
        assert!(!matches_pattern("record", "record-8.6.0"));
    }

    #[tokio::test]
    async fn test_bulk_stores_documents_and_reports_rejections() {
        let store = InMemoryStoreProvider::new();
        store.reject_document("1-2").await;

        let body = concat!(
            "{\"index\":{\"_index\":\"a\",\"_id\":\"1-1\",\"routing\":\"1\"}}\n",
            "{\"position\":1}\n",
            "{\"index\":{\"_index\":\"a\",\"_id\":\"1-2\",\"routing\":\"1\"}}\n",
            "{\"position\":2}\n"
        );

        let response = store.bulk(body.as_bytes()).await.unwrap();

        assert_eq!(response.item_count, 2);
        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].id, "1-2");

        let state = store.state().await;
        let document = state.document("a", "1-1").unwrap();
        assert_eq!(document.routing.as_deref(), Some("1"));
        assert_eq!(document.source["position"], 1);
        assert!(state.document("a", "1-2").is_none());
    }

    #[tokio::test]
    async fn test_fail_next_bulk() {
        let store = InMemoryStoreProvider::new();
        store.fail_next_bulk(1).await;

        let body = b"{\"index\":{\"_index\":\"a\",\"_id\":\"1\"}}\n{}\n";
        let first = store.bulk(body).await;
        let second = store.bulk(body).await;

        assert!(matches!(
            first,
            Err(StoreError::RequestRejected { status: 503, .. })
        ));
        assert!(second.is_ok());
        assert_eq!(store.state().await.bulk_requests, 2);
    }

    #[tokio::test]
    async fn test_policy_update_requires_current_tokens() {
        let store = InMemoryStoreProvider::new();
        let policy = LifecyclePolicy {
            name: "p".to_string(),
            minimum_age: "1d".to_string(),
            index_pattern: "record-*".to_string(),
            priority: 20,
        };

        store.put_lifecycle_policy(&policy, None).await.unwrap();
        let conflict = store.put_lifecycle_policy(&policy, None).await;
        assert!(matches!(
            conflict,
            Err(StoreError::RequestRejected { status: 409, .. })
        ));

        let stored = store.get_lifecycle_policy("p").await.unwrap().unwrap();
        store
            .put_lifecycle_policy(&policy, Some(&stored))
            .await
            .unwrap();
        assert_eq!(store.state().await.policy_puts, 2);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = InMemoryStoreProvider::new();
        store.set_unavailable(true).await;

        assert!(matches!(
            store.health_check().await,
            Err(StoreError::ConnectionError(_))
        ));
    }
}
