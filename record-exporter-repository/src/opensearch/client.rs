//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchStoreProvider`
//! using the OpenSearch Rust client. Lifecycle policies go through the index
//! state management plugin API, which the typed client does not cover.

use std::time::Duration;

use async_trait::async_trait;
use opensearch::{
    cluster::{
        ClusterGetComponentTemplateParts, ClusterHealthParts, ClusterPutComponentTemplateParts,
    },
    http::{
        headers::HeaderMap,
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
        Method,
    },
    indices::{IndicesGetSettingsParts, IndicesPutIndexTemplateParts, IndicesPutSettingsParts},
    BulkParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::errors::StoreError;
use crate::interfaces::SearchStoreProvider;
use crate::types::{BulkResponse, ComponentTemplate, IndexTemplate, LifecyclePolicy, StoredPolicy};

/// Path of the index state management policy API.
const ISM_POLICIES_PATH: &str = "/_plugins/_ism/policies";

/// OpenSearch client implementation.
///
/// Every request is bounded by the request timeout given at construction.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use record_exporter_repository::OpenSearchClient;
///
/// let client = OpenSearchClient::new("http://localhost:9200", Duration::from_secs(30)).await?;
/// let healthy = client.health_check().await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    request_timeout: Duration,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `request_timeout` - Upper bound for every request
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(StoreError)` - If the URL is invalid or the transport cannot be built
    pub async fn new(url: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let parsed_url = Url::parse(url).map_err(|e| StoreError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            request_timeout_ms = request_timeout.as_millis() as u64,
            "Created OpenSearch client"
        );

        Ok(Self {
            client,
            request_timeout,
        })
    }

    fn policy_path(name: &str) -> String {
        format!("{}/{}", ISM_POLICIES_PATH, name)
    }

    /// Turn a non-success response into a rejected request error.
    async fn ensure_success(response: Response, operation: &str) -> Result<Response, StoreError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %error_body, operation, "Request failed");
        Err(StoreError::rejected(status.as_u16(), error_body))
    }

    /// Parse component templates from a `_component_template` response.
    fn parse_component_templates(body: &Value) -> Vec<ComponentTemplate> {
        body.get("component_templates")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                let template = entry.get("component_template")?.clone();
                Some(ComponentTemplate::from_body(name, template))
            })
            .collect()
    }
}

#[async_trait]
impl SearchStoreProvider for OpenSearchClient {
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn bulk(&self, body: &[u8]) -> Result<BulkResponse, StoreError> {
        let response = self
            .client
            .bulk(BulkParts::None)
            .body(vec![body.to_vec()])
            .request_timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let response = Self::ensure_success(response, "bulk").await?;
        let response_body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::parse(e.to_string()))?;

        let bulk_response = BulkResponse::from_json(&response_body)?;
        debug!(
            items = bulk_response.item_count,
            failures = bulk_response.failures.len(),
            took_ms = bulk_response.took_ms,
            "Bulk request completed"
        );
        Ok(bulk_response)
    }

    async fn get_component_templates(
        &self,
        name_pattern: &str,
    ) -> Result<Vec<ComponentTemplate>, StoreError> {
        let names = [name_pattern];
        let response = self
            .client
            .cluster()
            .get_component_template(ClusterGetComponentTemplateParts::Name(&names))
            .request_timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        // A name matching nothing is answered with 404
        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }

        let response = Self::ensure_success(response, "get_component_template").await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::parse(e.to_string()))?;

        Ok(Self::parse_component_templates(&body))
    }

    #[instrument(skip(self, template), fields(name = %template.name))]
    async fn put_component_template(&self, template: &ComponentTemplate) -> Result<(), StoreError> {
        let response = self
            .client
            .cluster()
            .put_component_template(ClusterPutComponentTemplateParts::Name(&template.name))
            .body(template.body.clone())
            .request_timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        Self::ensure_success(response, "put_component_template")
            .await
            .map_err(|e| StoreError::template(e.to_string()))?;

        info!(name = %template.name, "Put component template");
        Ok(())
    }

    #[instrument(skip(self, template), fields(name = %template.name))]
    async fn put_index_template(&self, template: &IndexTemplate) -> Result<(), StoreError> {
        let response = self
            .client
            .indices()
            .put_index_template(IndicesPutIndexTemplateParts::Name(&template.name))
            .body(template.body())
            .request_timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        Self::ensure_success(response, "put_index_template")
            .await
            .map_err(|e| StoreError::template(e.to_string()))?;

        info!(name = %template.name, "Put index template");
        Ok(())
    }

    async fn get_lifecycle_policy(&self, name: &str) -> Result<Option<StoredPolicy>, StoreError> {
        let response = self
            .client
            .send(
                Method::Get,
                &Self::policy_path(name),
                HeaderMap::new(),
                None::<&Vec<(&str, String)>>,
                None::<JsonBody<Value>>,
                Some(self.request_timeout),
            )
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }

        let response = Self::ensure_success(response, "get_lifecycle_policy")
            .await
            .map_err(|e| StoreError::policy(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::parse(e.to_string()))?;

        StoredPolicy::from_json(&body).map(Some)
    }

    #[instrument(skip(self, policy, existing), fields(name = %policy.name))]
    async fn put_lifecycle_policy(
        &self,
        policy: &LifecyclePolicy,
        existing: Option<&StoredPolicy>,
    ) -> Result<(), StoreError> {
        // Updating an existing policy requires its concurrency tokens
        let query: Option<Vec<(&str, String)>> = existing.map(|stored| {
            vec![
                ("if_seq_no", stored.seq_no.to_string()),
                ("if_primary_term", stored.primary_term.to_string()),
            ]
        });

        let response = self
            .client
            .send(
                Method::Put,
                &Self::policy_path(&policy.name),
                HeaderMap::new(),
                query.as_ref(),
                Some(JsonBody::new(policy.body())),
                Some(self.request_timeout),
            )
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        Self::ensure_success(response, "put_lifecycle_policy")
            .await
            .map_err(|e| StoreError::policy(e.to_string()))?;

        info!(
            name = %policy.name,
            minimum_age = %policy.minimum_age,
            updated = existing.is_some(),
            "Put lifecycle policy"
        );
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let patterns = [pattern];
        let response = self
            .client
            .indices()
            .get_settings(IndicesGetSettingsParts::Index(&patterns))
            .allow_no_indices(true)
            .request_timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }

        let response = Self::ensure_success(response, "get_settings")
            .await
            .map_err(|e| StoreError::settings(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::parse(e.to_string()))?;

        let mut indices: Vec<String> = body
            .as_object()
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default();
        indices.sort();
        Ok(indices)
    }

    async fn update_index_settings(
        &self,
        indices: &[String],
        settings: &Value,
    ) -> Result<(), StoreError> {
        if indices.is_empty() {
            return Ok(());
        }

        let names: Vec<&str> = indices.iter().map(String::as_str).collect();
        let response = self
            .client
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&names))
            .body(settings.clone())
            .request_timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        Self::ensure_success(response, "put_settings")
            .await
            .map_err(|e| StoreError::settings(e.to_string()))?;

        debug!(count = indices.len(), "Updated index settings");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .request_timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            warn!(status = %response.status_code(), "Health check returned non-success status");
            return Ok(false);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::parse(e.to_string()))?;

        let status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("red");
        debug!(cluster_status = status, "Health check completed");

        Ok(status != "red")
    }
}
