//! Removal of fields older brokers do not know about.
//!
//! Indices of an older schema version have strict mappings for these
//! fields' parents, so documents produced for them must not carry fields
//! introduced in 8.6.

use serde_json::{Map, Value};

use record_exporter_shared::{SemanticVersion, ValueType};

/// First version whose records may carry the 8.6 fields.
const FIELDS_INTRODUCED_IN: (u64, u64) = (8, 6);

/// Whether records of `broker_version` predate the 8.6 fields.
///
/// Unparseable versions are treated as current.
pub fn predates_current_fields(broker_version: &str) -> bool {
    SemanticVersion::parse(broker_version)
        .map(|version| (version.major, version.minor) < FIELDS_INTRODUCED_IN)
        .unwrap_or(false)
}

/// `value` fields of `value_type` introduced in 8.6.
fn value_fields_since_8_6(value_type: ValueType) -> &'static [&'static str] {
    match value_type {
        ValueType::Deployment => &["deploymentKey"],
        ValueType::Decision | ValueType::Form | ValueType::Process => {
            &["deploymentKey", "versionTag"]
        }
        ValueType::UserTask => &["priority"],
        ValueType::Incident => &[
            "elementInstancePath",
            "processDefinitionPath",
            "callingElementPath",
        ],
        ValueType::Job => &["jobListenerEventType", "changedAttributes"],
        ValueType::CommandDistribution => &["queueId"],
        _ => &[],
    }
}

/// Strip from a serialized record the fields its broker version cannot have
/// produced.
pub fn strip_unknown_fields(
    document: &mut Map<String, Value>,
    value_type: ValueType,
    broker_version: &str,
) {
    if !predates_current_fields(broker_version) {
        return;
    }

    document.remove("operationReference");
    if let Some(Value::Object(value)) = document.get_mut("value") {
        for field in value_fields_since_8_6(value_type) {
            value.remove(*field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> Map<String, Value> {
        match json!({ "operationReference": 7, "value": value }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_predates_current_fields() {
        assert!(predates_current_fields("8.5.3"));
        assert!(predates_current_fields("7.9.0"));
        assert!(!predates_current_fields("8.6.0"));
        assert!(!predates_current_fields("8.6.0-alpha1"));
        assert!(!predates_current_fields("9.0.0"));
        assert!(!predates_current_fields("not-a-version"));
    }

    #[test]
    fn test_strips_fields_for_older_broker() {
        let mut doc = document(json!({
            "bpmnProcessId": "order",
            "deploymentKey": 1,
            "versionTag": "v1"
        }));

        strip_unknown_fields(&mut doc, ValueType::Process, "8.5.0");

        assert!(doc.get("operationReference").is_none());
        assert_eq!(doc["value"], json!({ "bpmnProcessId": "order" }));
    }

    #[test]
    fn test_deployment_keeps_version_tag() {
        let mut doc = document(json!({ "deploymentKey": 1, "versionTag": "v1" }));

        strip_unknown_fields(&mut doc, ValueType::Deployment, "8.5.0");

        assert_eq!(doc["value"], json!({ "versionTag": "v1" }));
    }

    #[test]
    fn test_incident_and_job_fields() {
        let mut incident = document(json!({
            "errorType": "IO",
            "elementInstancePath": [],
            "processDefinitionPath": [],
            "callingElementPath": []
        }));
        strip_unknown_fields(&mut incident, ValueType::Incident, "8.5.0");
        assert_eq!(incident["value"], json!({ "errorType": "IO" }));

        let mut job = document(json!({
            "type": "pay",
            "jobListenerEventType": "START",
            "changedAttributes": []
        }));
        strip_unknown_fields(&mut job, ValueType::Job, "8.5.0");
        assert_eq!(job["value"], json!({ "type": "pay" }));
    }

    #[test]
    fn test_current_broker_keeps_everything() {
        let mut doc = document(json!({ "priority": 50 }));

        strip_unknown_fields(&mut doc, ValueType::UserTask, "8.6.0");

        assert_eq!(doc["operationReference"], 7);
        assert_eq!(doc["value"]["priority"], 50);
    }
}
