//! Component template, index template and lifecycle policy definitions.
//!
//! The component template carries the mappings every record shares. Each
//! value type gets an index template composed of it, adding the mappings of
//! its payload and settings sized to its traffic.

use serde_json::{json, Map, Value};

use crate::config::{IndexConfig, RetentionConfig};
use crate::types::{ComponentTemplate, IndexTemplate, LifecyclePolicy};
use record_exporter_shared::{SemanticVersion, ValueType};

/// Index setting holding the lifecycle policy attached to an index.
pub const POLICY_ID_SETTING: &str = "plugins.index_state_management.policy_id";

/// The shared component template for `version`.
pub fn component_template(config: &IndexConfig, version: &SemanticVersion) -> ComponentTemplate {
    let body = json!({
        "template": {
            "mappings": {
                "dynamic": true,
                "properties": {
                    "partitionId": { "type": "integer" },
                    "position": { "type": "long" },
                    "sourceRecordPosition": { "type": "long" },
                    "sequence": { "type": "long" },
                    "key": { "type": "long" },
                    "timestamp": { "type": "date", "format": "epoch_millis" },
                    "recordType": { "type": "keyword" },
                    "valueType": { "type": "keyword" },
                    "intent": { "type": "keyword" },
                    "rejectionType": { "type": "keyword" },
                    "rejectionReason": { "type": "text" },
                    "brokerVersion": { "type": "keyword" },
                    "operationReference": { "type": "long" }
                }
            }
        },
        "_meta": {
            "version": version.to_string(),
            "managed_by": "record-exporter"
        }
    });

    ComponentTemplate {
        name: config.component_template_name(version),
        version: Some(version.clone()),
        body,
    }
}

/// The index template for `value_type`, composed of `component_template`.
pub fn index_template(
    config: &IndexConfig,
    retention: &RetentionConfig,
    value_type: ValueType,
    version: &SemanticVersion,
    component_template: &str,
) -> IndexTemplate {
    let mut index_settings = Map::new();
    index_settings.insert(
        "number_of_shards".to_string(),
        json!(config.shards_for(value_type)),
    );
    index_settings.insert(
        "number_of_replicas".to_string(),
        json!(config.number_of_replicas),
    );
    index_settings.insert("queries".to_string(), json!({ "cache": { "enabled": false } }));
    if retention.enabled {
        index_settings.insert(
            POLICY_ID_SETTING.to_string(),
            json!(config.lifecycle_policy_name()),
        );
    }

    IndexTemplate {
        name: config.index_template_name(value_type, version),
        index_patterns: vec![config.index_pattern(value_type, version)],
        composed_of: vec![component_template.to_string()],
        priority: config.template_priority,
        settings: json!({ "index": index_settings }),
        mappings: json!({
            "properties": {
                "value": {
                    "dynamic": true,
                    "properties": value_properties(value_type)
                }
            }
        }),
        aliases: vec![config.alias(value_type)],
        version: version.clone(),
    }
}

/// Mappings for the payload fields that are searched or aggregated on.
/// Everything else is mapped dynamically.
fn value_properties(value_type: ValueType) -> Value {
    match value_type {
        ValueType::ProcessInstance => json!({
            "bpmnProcessId": { "type": "keyword" },
            "processDefinitionKey": { "type": "long" },
            "processInstanceKey": { "type": "long" },
            "elementId": { "type": "keyword" },
            "bpmnElementType": { "type": "keyword" },
            "flowScopeKey": { "type": "long" },
            "tenantId": { "type": "keyword" }
        }),
        ValueType::Job => json!({
            "type": { "type": "keyword" },
            "worker": { "type": "keyword" },
            "retries": { "type": "integer" },
            "deadline": { "type": "date", "format": "epoch_millis" },
            "processInstanceKey": { "type": "long" },
            "elementId": { "type": "keyword" },
            "tenantId": { "type": "keyword" }
        }),
        ValueType::Variable => json!({
            "name": { "type": "keyword" },
            "value": { "type": "text" },
            "scopeKey": { "type": "long" },
            "processInstanceKey": { "type": "long" },
            "tenantId": { "type": "keyword" }
        }),
        ValueType::Incident => json!({
            "errorType": { "type": "keyword" },
            "errorMessage": { "type": "text" },
            "processInstanceKey": { "type": "long" },
            "elementInstanceKey": { "type": "long" },
            "jobKey": { "type": "long" },
            "tenantId": { "type": "keyword" }
        }),
        ValueType::Message => json!({
            "name": { "type": "keyword" },
            "correlationKey": { "type": "keyword" },
            "messageId": { "type": "keyword" },
            "timeToLive": { "type": "long" },
            "tenantId": { "type": "keyword" }
        }),
        ValueType::Timer => json!({
            "dueDate": { "type": "date", "format": "epoch_millis" },
            "repetitions": { "type": "integer" },
            "targetElementId": { "type": "keyword" },
            "processInstanceKey": { "type": "long" },
            "tenantId": { "type": "keyword" }
        }),
        _ => json!({
            "tenantId": { "type": "keyword" }
        }),
    }
}

/// The retention policy deleting indices of this prefix after the
/// configured minimum age.
pub fn lifecycle_policy(config: &IndexConfig, retention: &RetentionConfig) -> LifecyclePolicy {
    LifecyclePolicy {
        name: config.lifecycle_policy_name(),
        minimum_age: retention.minimum_age.clone(),
        index_pattern: config.all_indices_pattern(),
        priority: config.template_priority,
    }
}

/// Index settings attaching `policy_name`, or detaching any policy when
/// `None`.
pub fn lifecycle_settings(policy_name: Option<&str>) -> Value {
    json!({ "index": { POLICY_ID_SETTING: policy_name } })
}
