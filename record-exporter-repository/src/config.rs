//! Configuration types for index naming, index settings and retention.

use record_exporter_shared::{SemanticVersion, TrafficClass, ValueType};

/// Naming and sizing of the indices and templates the exporter manages.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Prefix shared by every template, index, alias and policy name.
    pub prefix: String,
    /// `chrono` format string appended to index names, e.g. `%Y-%m-%d`.
    pub date_pattern: String,
    /// Primary shards for value types with little write traffic.
    pub low_traffic_shards: u32,
    /// Primary shards for process instance, job, variable and similar types.
    pub high_traffic_shards: u32,
    pub number_of_replicas: u32,
    /// Index template priority. Must beat any catch-all template.
    pub template_priority: u32,
    /// Number of indices updated per settings request.
    pub settings_update_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            prefix: "process-record".to_string(),
            date_pattern: "%Y-%m-%d".to_string(),
            low_traffic_shards: 1,
            high_traffic_shards: 3,
            number_of_replicas: 0,
            template_priority: 20,
            settings_update_batch_size: 100,
        }
    }
}

impl IndexConfig {
    /// Create a config with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn shards_for(&self, value_type: ValueType) -> u32 {
        match value_type.traffic_class() {
            TrafficClass::High => self.high_traffic_shards,
            TrafficClass::Low => self.low_traffic_shards,
        }
    }

    /// `<prefix>-<version>`
    pub fn component_template_name(&self, version: &SemanticVersion) -> String {
        format!("{}-{}", self.prefix, version)
    }

    /// `<prefix>-*`, matching every component template of this prefix.
    pub fn component_template_pattern(&self) -> String {
        format!("{}-*", self.prefix)
    }

    /// `<prefix>-<value-type>-<version>`
    pub fn index_template_name(&self, value_type: ValueType, version: &SemanticVersion) -> String {
        format!("{}-{}-{}", self.prefix, value_type.index_fragment(), version)
    }

    /// `<prefix>-<value-type>-<version>_*`
    pub fn index_pattern(&self, value_type: ValueType, version: &SemanticVersion) -> String {
        format!("{}_*", self.index_template_name(value_type, version))
    }

    /// `<prefix>-<value-type>-<version>_<date>`
    pub fn index_name(
        &self,
        value_type: ValueType,
        version: &SemanticVersion,
        date_suffix: &str,
    ) -> String {
        format!(
            "{}_{}",
            self.index_template_name(value_type, version),
            date_suffix
        )
    }

    /// Alias spanning every version and date of a value type.
    pub fn alias(&self, value_type: ValueType) -> String {
        format!("{}-{}", self.prefix, value_type.index_fragment())
    }

    /// `<prefix>-*`, matching every index this exporter writes.
    pub fn all_indices_pattern(&self) -> String {
        format!("{}-*", self.prefix)
    }

    pub fn lifecycle_policy_name(&self) -> String {
        format!("{}-retention-policy", self.prefix)
    }
}

/// Time based deletion of old indices.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub enabled: bool,
    /// Minimum index age before deletion, `<digits>[dhms]`, e.g. `30d`.
    pub minimum_age: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            minimum_age: "30d".to_string(),
        }
    }
}

impl RetentionConfig {
    /// Create an enabled retention config with the given minimum age.
    pub fn enabled(minimum_age: impl Into<String>) -> Self {
        Self {
            enabled: true,
            minimum_age: minimum_age.into(),
        }
    }
}
