//! Settings read from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use record_exporter_pipeline::filter::{parse_rules, VariableNameRules};
use record_exporter_pipeline::{BulkConfig, ExporterConfig, FilterConfig};
use record_exporter_repository::{IndexConfig, RetentionConfig};
use record_exporter_shared::{SemanticVersion, ValueType};

use super::validation::{
    non_negative, positive, validate_date_pattern, validate_minimum_age, validate_partition_id,
    validate_prefix,
};
use crate::ExporterError;

const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_REQUEST_TIMEOUT_MS: i64 = 30_000;
const DEFAULT_PARTITION_ID: i32 = 1;
const DEFAULT_SCHEMA_VERSION: &str = "8.6.0";
const DEFAULT_INDEX_PREFIX: &str = "process-record";
const DEFAULT_DATE_PATTERN: &str = "%Y-%m-%d";
const DEFAULT_SHARDS_LOW: i64 = 1;
const DEFAULT_SHARDS_HIGH: i64 = 3;
const DEFAULT_REPLICAS: i64 = 0;
const DEFAULT_TEMPLATE_PRIORITY: i64 = 20;
const DEFAULT_BULK_SIZE: i64 = 1000;
const DEFAULT_BULK_MEMORY_LIMIT: i64 = 10 * 1024 * 1024;
const DEFAULT_BULK_DELAY_MS: i64 = 5000;
const DEFAULT_BULK_MAX_RETRIES: i64 = 3;
const DEFAULT_MINIMUM_AGE: &str = "30d";
const DEFAULT_SETTINGS_BATCH_SIZE: i64 = 100;
const DEFAULT_RECORDS_PATH: &str = "records.ndjson";
const DEFAULT_STATE_PATH: &str = "exporter-state.json";

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch_url: String,
    pub request_timeout: Duration,
    pub schema_version: SemanticVersion,
    pub index: IndexConfig,
    pub retention: RetentionConfig,
    /// Install templates and policies before the first bulk request.
    pub create_templates: bool,
    pub bulk: BulkConfig,
    pub exporter: ExporterConfig,
    pub records_path: PathBuf,
    pub state_path: PathBuf,
}

impl Settings {
    /// Read the settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_REQUEST_TIMEOUT_MS`: per request timeout (default: 30000)
    /// - `EXPORTER_PARTITION_ID`: partition whose records are exported (default: 1)
    /// - `EXPORTER_SCHEMA_VERSION`: version of the installed templates (default: 8.6.0)
    /// - `EXPORTER_INDEX_*`, `EXPORTER_BULK_*`, `EXPORTER_RETENTION_*`: index,
    ///   bulk and retention settings
    /// - `EXPORTER_RECORD_*`, `EXPORTER_VALUE_TYPES_*`, `EXPORTER_VARIABLE_NAME_*`:
    ///   record filter
    /// - `EXPORTER_RECORDS_PATH`, `EXPORTER_STATE_PATH`: input and state files
    pub fn from_env() -> Result<Self, ExporterError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the settings through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExporterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let opensearch_url = vars.string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL);
        let request_timeout_ms = vars.parse(
            "OPENSEARCH_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        let request_timeout = Duration::from_millis(
            positive("OPENSEARCH_REQUEST_TIMEOUT_MS", request_timeout_ms)? as u64,
        );

        let schema_version_raw = vars.string("EXPORTER_SCHEMA_VERSION", DEFAULT_SCHEMA_VERSION);
        let schema_version = schema_version_raw.parse::<SemanticVersion>().map_err(|e| {
            ExporterError::config(format!("Invalid EXPORTER_SCHEMA_VERSION: {}", e))
        })?;

        let index = IndexConfig {
            prefix: vars.string("EXPORTER_INDEX_PREFIX", DEFAULT_INDEX_PREFIX),
            date_pattern: vars.string("EXPORTER_INDEX_DATE_PATTERN", DEFAULT_DATE_PATTERN),
            low_traffic_shards: non_negative(
                "EXPORTER_INDEX_SHARDS_LOW",
                vars.parse("EXPORTER_INDEX_SHARDS_LOW", DEFAULT_SHARDS_LOW)?,
            )?,
            high_traffic_shards: non_negative(
                "EXPORTER_INDEX_SHARDS_HIGH",
                vars.parse("EXPORTER_INDEX_SHARDS_HIGH", DEFAULT_SHARDS_HIGH)?,
            )?,
            number_of_replicas: non_negative(
                "EXPORTER_INDEX_REPLICAS",
                vars.parse("EXPORTER_INDEX_REPLICAS", DEFAULT_REPLICAS)?,
            )?,
            template_priority: non_negative(
                "EXPORTER_INDEX_TEMPLATE_PRIORITY",
                vars.parse("EXPORTER_INDEX_TEMPLATE_PRIORITY", DEFAULT_TEMPLATE_PRIORITY)?,
            )?,
            settings_update_batch_size: positive(
                "EXPORTER_SETTINGS_BATCH_SIZE",
                vars.parse("EXPORTER_SETTINGS_BATCH_SIZE", DEFAULT_SETTINGS_BATCH_SIZE)?,
            )?,
        };

        let retention = RetentionConfig {
            enabled: vars.parse("EXPORTER_RETENTION_ENABLED", false)?,
            minimum_age: vars.string("EXPORTER_RETENTION_MINIMUM_AGE", DEFAULT_MINIMUM_AGE),
        };

        let bulk = BulkConfig {
            size: positive(
                "EXPORTER_BULK_SIZE",
                vars.parse("EXPORTER_BULK_SIZE", DEFAULT_BULK_SIZE)?,
            )?,
            memory_limit: positive(
                "EXPORTER_BULK_MEMORY_LIMIT",
                vars.parse("EXPORTER_BULK_MEMORY_LIMIT", DEFAULT_BULK_MEMORY_LIMIT)?,
            )?,
            delay: Duration::from_millis(positive(
                "EXPORTER_BULK_DELAY_MS",
                vars.parse("EXPORTER_BULK_DELAY_MS", DEFAULT_BULK_DELAY_MS)?,
            )? as u64),
            max_retries: non_negative(
                "EXPORTER_BULK_MAX_RETRIES",
                vars.parse("EXPORTER_BULK_MAX_RETRIES", DEFAULT_BULK_MAX_RETRIES)?,
            )?,
            ..BulkConfig::default()
        };

        let filter = FilterConfig {
            enabled_value_types: vars.value_types("EXPORTER_VALUE_TYPES_ENABLED")?,
            disabled_value_types: vars.value_types("EXPORTER_VALUE_TYPES_DISABLED")?,
            event: vars.parse("EXPORTER_RECORD_EVENT", true)?,
            command: vars.parse("EXPORTER_RECORD_COMMAND", false)?,
            rejection: vars.parse("EXPORTER_RECORD_REJECTION", false)?,
            variable_names: VariableNameRules::new(
                parse_rules(vars.list("EXPORTER_VARIABLE_NAME_INCLUSION")),
                parse_rules(vars.list("EXPORTER_VARIABLE_NAME_EXCLUSION")),
            ),
        };

        let exporter = ExporterConfig {
            partition_id: vars.parse("EXPORTER_PARTITION_ID", DEFAULT_PARTITION_ID)?,
            filter,
        };

        Ok(Self {
            opensearch_url,
            request_timeout,
            schema_version,
            index,
            retention,
            create_templates: vars.parse("EXPORTER_CREATE_TEMPLATE", true)?,
            bulk,
            exporter,
            records_path: PathBuf::from(vars.string("EXPORTER_RECORDS_PATH", DEFAULT_RECORDS_PATH)),
            state_path: PathBuf::from(vars.string("EXPORTER_STATE_PATH", DEFAULT_STATE_PATH)),
        })
    }

    /// Check the values the store would reject only once it is written to.
    pub fn validate(&self) -> Result<(), ExporterError> {
        validate_prefix(&self.index.prefix)?;
        validate_date_pattern(&self.index.date_pattern)?;
        if self.retention.enabled {
            validate_minimum_age(&self.retention.minimum_age)?;
        }
        if self.index.low_traffic_shards == 0 || self.index.high_traffic_shards == 0 {
            return Err(ExporterError::config(
                "Indices need at least one primary shard",
            ));
        }
        validate_partition_id(self.exporter.partition_id)?;
        Ok(())
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, `None` when unset or blank.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ExporterError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| ExporterError::config(format!("Invalid {} '{}': {}", key, raw, e))),
            None => Ok(default),
        }
    }

    /// Comma separated list, blank entries dropped.
    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(|entry| entry.trim().to_string())
                    .filter(|entry| !entry.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn value_types<C>(&self, key: &str) -> Result<C, ExporterError>
    where
        C: FromIterator<ValueType>,
    {
        self.list(key)
            .iter()
            .map(|name| {
                name.parse::<ValueType>()
                    .map_err(|e| ExporterError::config(format!("Invalid {}: {}", key, e)))
            })
            .collect()
    }
}
