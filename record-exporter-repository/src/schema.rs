//! Schema management.
//!
//! Installs the shared component template, the per value type index
//! templates and the retention policy. A component template is never
//! replaced by an older version: during a rolling upgrade an exporter of an
//! older broker reuses the newer template instead of downgrading it.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::{IndexConfig, RetentionConfig};
use crate::errors::StoreError;
use crate::interfaces::SearchStoreProvider;
use crate::templates;
use crate::types::ComponentTemplate;
use record_exporter_shared::{SemanticVersion, ValueType};

/// Installs and upgrades templates and lifecycle policies for one prefix.
pub struct SchemaManager {
    provider: Arc<dyn SearchStoreProvider>,
    index_config: IndexConfig,
    retention: RetentionConfig,
    version: SemanticVersion,
    /// Component template the index templates are composed of, once known.
    component_template: Option<String>,
}

impl SchemaManager {
    pub fn new(
        provider: Arc<dyn SearchStoreProvider>,
        index_config: IndexConfig,
        retention: RetentionConfig,
        version: SemanticVersion,
    ) -> Self {
        Self {
            provider,
            index_config,
            retention,
            version,
            component_template: None,
        }
    }

    /// Schema version this manager installs.
    pub fn version(&self) -> &SemanticVersion {
        &self.version
    }

    pub fn index_config(&self) -> &IndexConfig {
        &self.index_config
    }

    /// Version of a component template of this prefix, or `None` when the
    /// name does not end in a version.
    fn template_version(&self, template: &ComponentTemplate) -> Option<SemanticVersion> {
        let suffix = template
            .name
            .strip_prefix(&self.index_config.prefix)?
            .strip_prefix('-')?;
        let name_version = SemanticVersion::parse(suffix)?;
        Some(template.version.clone().unwrap_or(name_version))
    }

    /// Install the component template unless the same or a newer version is
    /// already present.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Name of the component template index templates must
    ///   be composed of
    /// * `Err(StoreError)` - If listing or installing templates fails
    #[instrument(skip(self), fields(version = %self.version))]
    pub async fn create_component_template(&mut self) -> Result<String, StoreError> {
        if let Some(name) = &self.component_template {
            return Ok(name.clone());
        }

        let own_name = self.index_config.component_template_name(&self.version);
        let existing = self
            .provider
            .get_component_templates(&self.index_config.component_template_pattern())
            .await?;

        let newest = existing
            .iter()
            .filter_map(|template| {
                self.template_version(template)
                    .map(|version| (version, template))
            })
            .filter(|(version, _)| version.is_newer_than(&self.version))
            .max_by(|(a, _), (b, _)| a.cmp(b));

        let resolved = if let Some((newer_version, template)) = newest {
            info!(
                existing = %template.name,
                existing_version = %newer_version,
                "Newer component template present, skipping installation"
            );
            template.name.clone()
        } else if existing.iter().any(|template| template.name == own_name) {
            debug!(name = %own_name, "Component template already installed");
            own_name
        } else {
            let template = templates::component_template(&self.index_config, &self.version);
            self.provider.put_component_template(&template).await?;
            info!(name = %own_name, "Installed component template");
            own_name
        };

        self.component_template = Some(resolved.clone());
        Ok(resolved)
    }

    /// Install the index template of `value_type`, composed of the resolved
    /// component template.
    #[instrument(skip(self), fields(version = %self.version))]
    pub async fn create_index_template(&mut self, value_type: ValueType) -> Result<(), StoreError> {
        let component_template = self.create_component_template().await?;
        let template = templates::index_template(
            &self.index_config,
            &self.retention,
            value_type,
            &self.version,
            &component_template,
        );

        self.provider.put_index_template(&template).await?;
        debug!(
            name = %template.name,
            composed_of = %component_template,
            "Installed index template"
        );
        Ok(())
    }

    /// Install the component template, the retention policy when enabled,
    /// and the index template of every value type given.
    pub async fn create_schema(&mut self, value_types: &[ValueType]) -> Result<(), StoreError> {
        self.create_component_template().await?;
        if self.retention.enabled {
            self.put_index_lifecycle_management_policy().await?;
        }
        for value_type in value_types {
            self.create_index_template(*value_type).await?;
        }

        info!(
            value_types = value_types.len(),
            version = %self.version,
            "Schema created"
        );
        Ok(())
    }

    /// Create or update the retention policy.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The policy was created or changed
    /// * `Ok(false)` - The stored policy already has the configured minimum age
    /// * `Err(StoreError)` - If the policy cannot be read or written
    pub async fn put_index_lifecycle_management_policy(&self) -> Result<bool, StoreError> {
        let policy = templates::lifecycle_policy(&self.index_config, &self.retention);
        let stored = self.provider.get_lifecycle_policy(&policy.name).await?;

        if let Some(stored) = &stored {
            if stored.minimum_age.as_deref() == Some(policy.minimum_age.as_str()) {
                debug!(name = %policy.name, "Lifecycle policy unchanged");
                return Ok(false);
            }
        }

        self.provider
            .put_lifecycle_policy(&policy, stored.as_ref())
            .await?;
        Ok(true)
    }

    /// Attach the retention policy to every existing index of this prefix,
    /// or detach it when retention is disabled.
    ///
    /// Indices are updated in pages of `settings_update_batch_size`.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of indices updated
    /// * `Err(StoreError)` - If listing or updating fails; earlier pages stay applied
    #[instrument(skip(self), fields(enabled = self.retention.enabled))]
    pub async fn update_lifecycle_on_existing_indices(&self) -> Result<usize, StoreError> {
        let indices = self
            .provider
            .list_indices(&self.index_config.all_indices_pattern())
            .await?;
        if indices.is_empty() {
            return Ok(0);
        }

        let policy_name = self.index_config.lifecycle_policy_name();
        let settings = templates::lifecycle_settings(
            self.retention.enabled.then_some(policy_name.as_str()),
        );
        let page_size = self.index_config.settings_update_batch_size.max(1);

        for page in indices.chunks(page_size) {
            self.provider.update_index_settings(page, &settings).await?;
        }

        info!(
            count = indices.len(),
            pages = indices.len().div_ceil(page_size),
            "Updated lifecycle policy on existing indices"
        );
        Ok(indices.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::POLICY_ID_SETTING;
    use crate::testing::InMemoryStoreProvider;

    fn manager(
        store: &Arc<InMemoryStoreProvider>,
        retention: RetentionConfig,
        version: SemanticVersion,
    ) -> SchemaManager {
        SchemaManager::new(
            store.clone(),
            IndexConfig::with_prefix("record"),
            retention,
            version,
        )
    }

    #[tokio::test]
    async fn test_installs_component_template_once() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let mut schema = manager(&store, RetentionConfig::default(), SemanticVersion::new(8, 6, 0));

        assert_eq!(schema.create_component_template().await.unwrap(), "record-8.6.0");
        assert_eq!(schema.create_component_template().await.unwrap(), "record-8.6.0");

        let state = store.state().await;
        assert_eq!(state.component_template_puts, 1);
        assert!(state.component_templates.contains_key("record-8.6.0"));
    }

    #[tokio::test]
    async fn test_skips_existing_template_of_same_version() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let version = SemanticVersion::new(8, 6, 0);
        store
            .insert_component_template(templates::component_template(
                &IndexConfig::with_prefix("record"),
                &version,
            ))
            .await;

        let mut schema = manager(&store, RetentionConfig::default(), version);
        assert_eq!(schema.create_component_template().await.unwrap(), "record-8.6.0");
        assert_eq!(store.state().await.component_template_puts, 0);
    }

    #[tokio::test]
    async fn test_never_downgrades_component_template() {
        let store = Arc::new(InMemoryStoreProvider::new());

        let mut newer = manager(&store, RetentionConfig::default(), SemanticVersion::new(8, 6, 0));
        newer.create_schema(&[ValueType::Job]).await.unwrap();

        let mut older = manager(&store, RetentionConfig::default(), SemanticVersion::new(8, 5, 0));
        older
            .create_schema(&[ValueType::Job, ValueType::ProcessInstance])
            .await
            .unwrap();

        let state = store.state().await;
        assert_eq!(
            state.component_templates.keys().collect::<Vec<_>>(),
            vec!["record-8.6.0"]
        );
        assert_eq!(
            state.component_templates["record-8.6.0"].body["_meta"]["version"],
            "8.6.0"
        );
        for template in state.index_templates.values() {
            assert_eq!(template.composed_of, vec!["record-8.6.0"]);
        }
        assert!(state.index_templates.contains_key("record-job-8.5.0"));
    }

    #[tokio::test]
    async fn test_newer_version_read_from_name_without_meta() {
        let store = Arc::new(InMemoryStoreProvider::new());
        store
            .insert_component_template(ComponentTemplate::from_body(
                "record-8.7.1",
                serde_json::json!({ "template": {} }),
            ))
            .await;
        // Not a version suffix, ignored
        store
            .insert_component_template(ComponentTemplate::from_body(
                "record-custom",
                serde_json::json!({ "template": {}, "_meta": { "version": "9.9.9" } }),
            ))
            .await;

        let mut schema = manager(&store, RetentionConfig::default(), SemanticVersion::new(8, 6, 0));

        assert_eq!(schema.create_component_template().await.unwrap(), "record-8.7.1");
        assert_eq!(store.state().await.component_template_puts, 0);
    }

    #[tokio::test]
    async fn test_older_template_is_superseded() {
        let store = Arc::new(InMemoryStoreProvider::new());
        store
            .insert_component_template(templates::component_template(
                &IndexConfig::with_prefix("record"),
                &SemanticVersion::new(8, 5, 0),
            ))
            .await;

        let mut schema = manager(&store, RetentionConfig::default(), SemanticVersion::new(8, 6, 0));

        assert_eq!(schema.create_component_template().await.unwrap(), "record-8.6.0");
        assert_eq!(store.state().await.component_templates.len(), 2);
    }

    #[tokio::test]
    async fn test_create_schema_with_retention_installs_policy() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let mut schema = manager(&store, RetentionConfig::enabled("7d"), SemanticVersion::new(8, 6, 0));

        schema.create_schema(&[ValueType::Variable]).await.unwrap();

        let state = store.state().await;
        let (policy, stored) = &state.policies["record-retention-policy"];
        assert_eq!(policy.minimum_age, "7d");
        assert_eq!(stored.minimum_age.as_deref(), Some("7d"));
        let template = &state.index_templates["record-variable-8.6.0"];
        assert_eq!(
            template.settings["index"][POLICY_ID_SETTING],
            "record-retention-policy"
        );
    }

    #[tokio::test]
    async fn test_lifecycle_policy_is_idempotent() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let schema = manager(&store, RetentionConfig::enabled("7d"), SemanticVersion::new(8, 6, 0));

        assert!(schema.put_index_lifecycle_management_policy().await.unwrap());
        assert!(!schema.put_index_lifecycle_management_policy().await.unwrap());
        assert_eq!(store.state().await.policy_puts, 1);

        let changed = manager(&store, RetentionConfig::enabled("14d"), SemanticVersion::new(8, 6, 0));
        assert!(changed.put_index_lifecycle_management_policy().await.unwrap());

        let state = store.state().await;
        assert_eq!(state.policy_puts, 2);
        assert_eq!(state.policies["record-retention-policy"].1.seq_no, 1);
    }

    #[tokio::test]
    async fn test_update_lifecycle_on_existing_indices_in_pages() {
        let store = Arc::new(InMemoryStoreProvider::new());
        for day in 1..=5 {
            store.add_index(format!("record-job-8.6.0_2024-06-0{}", day)).await;
        }
        store.add_index("unrelated-index").await;

        let mut config = IndexConfig::with_prefix("record");
        config.settings_update_batch_size = 2;
        let schema = SchemaManager::new(
            store.clone(),
            config,
            RetentionConfig::enabled("7d"),
            SemanticVersion::new(8, 6, 0),
        );

        assert_eq!(schema.update_lifecycle_on_existing_indices().await.unwrap(), 5);

        let state = store.state().await;
        let page_sizes: Vec<usize> = state
            .settings_updates
            .iter()
            .map(|(indices, _)| indices.len())
            .collect();
        assert_eq!(page_sizes, vec![2, 2, 1]);
        assert_eq!(
            state.settings_updates[0].1["index"][POLICY_ID_SETTING],
            "record-retention-policy"
        );
    }

    #[tokio::test]
    async fn test_disabled_retention_detaches_policy() {
        let store = Arc::new(InMemoryStoreProvider::new());
        store.add_index("record-job-8.6.0_2024-06-01").await;
        let schema = manager(&store, RetentionConfig::default(), SemanticVersion::new(8, 6, 0));

        assert_eq!(schema.update_lifecycle_on_existing_indices().await.unwrap(), 1);

        let state = store.state().await;
        assert!(state.settings_updates[0].1["index"][POLICY_ID_SETTING].is_null());
    }

    #[tokio::test]
    async fn test_no_indices_no_requests() {
        let store = Arc::new(InMemoryStoreProvider::new());
        let schema = manager(&store, RetentionConfig::enabled("7d"), SemanticVersion::new(8, 6, 0));

        assert_eq!(schema.update_lifecycle_on_existing_indices().await.unwrap(), 0);
        assert!(store.state().await.settings_updates.is_empty());
    }
}
