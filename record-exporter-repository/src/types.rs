//! Request and response types for search store operations.

use serde_json::{json, Value};

use crate::errors::StoreError;
use record_exporter_shared::SemanticVersion;

/// A single item of a bulk request that the store refused.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    pub index: String,
    pub id: String,
    pub status: u16,
    /// Store error type, e.g. `mapper_parsing_exception`.
    pub error_type: String,
    pub reason: String,
}

/// Outcome of a bulk request the store accepted.
///
/// An accepted request can still contain failed items; callers decide how
/// to treat them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub took_ms: u64,
    pub item_count: usize,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkResponse {
    /// Create a response where every item succeeded.
    pub fn succeeded(item_count: usize) -> Self {
        Self {
            took_ms: 0,
            item_count,
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Parse a bulk API response body.
    ///
    /// Every item is inspected regardless of the top level `errors` flag.
    pub fn from_json(body: &Value) -> Result<Self, StoreError> {
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::parse("Bulk response has no items"))?;

        let failures = items
            .iter()
            .filter_map(|item| {
                // Each item is keyed by its action: index, create, update or delete.
                let (_, result) = item.as_object()?.iter().next()?;
                let error = result.get("error")?;
                Some(BulkItemFailure {
                    index: string_field(result, "_index"),
                    id: string_field(result, "_id"),
                    status: result
                        .get("status")
                        .and_then(Value::as_u64)
                        .unwrap_or_default() as u16,
                    error_type: string_field(error, "type"),
                    reason: string_field(error, "reason"),
                })
            })
            .collect();

        Ok(Self {
            took_ms: body.get("took").and_then(Value::as_u64).unwrap_or_default(),
            item_count: items.len(),
            failures,
        })
    }
}

fn string_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A named, versioned component template.
///
/// `body` is the component template definition as sent to the store:
/// `{"template": {...}, "_meta": {"version": ...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTemplate {
    pub name: String,
    pub version: Option<SemanticVersion>,
    pub body: Value,
}

impl ComponentTemplate {
    /// Build a template from a body, reading the version from `_meta.version`.
    pub fn from_body(name: impl Into<String>, body: Value) -> Self {
        let version = body
            .get("_meta")
            .and_then(|meta| meta.get("version"))
            .and_then(Value::as_str)
            .and_then(SemanticVersion::parse);
        Self {
            name: name.into(),
            version,
            body,
        }
    }
}

/// An index template binding an index pattern to settings, mappings and
/// component templates.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTemplate {
    pub name: String,
    pub index_patterns: Vec<String>,
    pub composed_of: Vec<String>,
    pub priority: u32,
    pub settings: Value,
    pub mappings: Value,
    pub aliases: Vec<String>,
    pub version: SemanticVersion,
}

impl IndexTemplate {
    pub fn body(&self) -> Value {
        let aliases: serde_json::Map<String, Value> = self
            .aliases
            .iter()
            .map(|alias| (alias.clone(), json!({})))
            .collect();

        json!({
            "index_patterns": self.index_patterns,
            "composed_of": self.composed_of,
            "priority": self.priority,
            "template": {
                "settings": self.settings,
                "mappings": self.mappings,
                "aliases": aliases
            },
            "_meta": {
                "version": self.version.to_string()
            }
        })
    }
}

/// An index state management policy deleting indices after a minimum age.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecyclePolicy {
    pub name: String,
    pub minimum_age: String,
    pub index_pattern: String,
    pub priority: u32,
}

impl LifecyclePolicy {
    pub fn body(&self) -> Value {
        json!({
            "policy": {
                "description": format!("Deletes indices older than {}", self.minimum_age),
                "default_state": "open",
                "states": [
                    {
                        "name": "open",
                        "actions": [],
                        "transitions": [
                            {
                                "state_name": "delete",
                                "conditions": { "min_index_age": self.minimum_age }
                            }
                        ]
                    },
                    {
                        "name": "delete",
                        "actions": [ { "delete": {} } ],
                        "transitions": []
                    }
                ],
                "ism_template": [
                    {
                        "index_patterns": [self.index_pattern],
                        "priority": self.priority
                    }
                ]
            }
        })
    }
}

/// A lifecycle policy as currently stored, with the concurrency tokens
/// needed to update it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPolicy {
    pub minimum_age: Option<String>,
    pub seq_no: i64,
    pub primary_term: i64,
}

impl StoredPolicy {
    /// Parse the response of a policy lookup.
    pub fn from_json(body: &Value) -> Result<Self, StoreError> {
        let seq_no = body
            .get("_seq_no")
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::parse("Policy response has no _seq_no"))?;
        let primary_term = body
            .get("_primary_term")
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::parse("Policy response has no _primary_term"))?;

        let minimum_age = body
            .pointer("/policy/states")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|state| state.get("transitions").and_then(Value::as_array))
            .flatten()
            .find_map(|transition| {
                transition
                    .pointer("/conditions/min_index_age")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        Ok(Self {
            minimum_age,
            seq_no,
            primary_term,
        })
    }
}
