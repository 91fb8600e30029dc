//! The immutable record produced by a partition's event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_type::{RecordType, ValueType};
use crate::version::SemanticVersion;

/// A domain event emitted by the engine's partitioned log.
///
/// Records are identified by `(partition_id, position)`. The `value` payload
/// is opaque to the exporter apart from the few fields the filter and the
/// version-aware serializer inspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub partition_id: i32,
    pub position: i64,
    #[serde(default = "no_position")]
    pub source_record_position: i64,
    pub key: i64,
    /// Epoch milliseconds at which the record was written.
    pub timestamp: i64,
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub broker_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_reference: Option<i64>,
    /// Authorization claims carried for the engine's own use; never exported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizations: Option<Value>,
    #[serde(default)]
    pub value: Value,
}

fn no_position() -> i64 {
    -1
}

impl Record {
    /// Create a record with the identifying fields set and an empty payload.
    pub fn new(
        partition_id: i32,
        position: i64,
        value_type: ValueType,
        record_type: RecordType,
        broker_version: impl Into<String>,
    ) -> Self {
        Self {
            partition_id,
            position,
            source_record_position: no_position(),
            key: position,
            timestamp: 0,
            record_type,
            value_type,
            intent: String::new(),
            rejection_type: None,
            rejection_reason: None,
            broker_version: broker_version.into(),
            operation_reference: None,
            authorizations: None,
            value: Value::Object(Default::default()),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = intent.into();
        self
    }

    pub fn with_key(mut self, key: i64) -> Self {
        self.key = key;
        self
    }

    pub fn with_operation_reference(mut self, reference: i64) -> Self {
        self.operation_reference = Some(reference);
        self
    }

    pub fn with_authorizations(mut self, authorizations: Value) -> Self {
        self.authorizations = Some(authorizations);
        self
    }

    /// The broker version the record was written with, if parseable.
    pub fn broker_semantic_version(&self) -> Option<SemanticVersion> {
        SemanticVersion::parse(&self.broker_version)
    }

    /// The record timestamp as a UTC date time. Out of range timestamps
    /// fall back to the Unix epoch.
    pub fn written_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }

    /// The variable name, for `VARIABLE` records.
    pub fn variable_name(&self) -> Option<&str> {
        if self.value_type != ValueType::Variable {
            return None;
        }
        self.value.get("name").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_camel_case_record() {
        let record: Record = serde_json::from_value(json!({
            "partitionId": 1,
            "position": 42,
            "key": 2251799813685249i64,
            "timestamp": 1718000000000i64,
            "recordType": "EVENT",
            "valueType": "VARIABLE",
            "intent": "CREATED",
            "brokerVersion": "8.6.0",
            "value": { "name": "orderId", "value": "\"A-1\"" }
        }))
        .unwrap();

        assert_eq!(record.partition_id, 1);
        assert_eq!(record.position, 42);
        assert_eq!(record.source_record_position, -1);
        assert_eq!(record.value_type, ValueType::Variable);
        assert_eq!(record.variable_name(), Some("orderId"));
        assert!(record.authorizations.is_none());
    }

    #[test]
    fn test_serialize_omits_absent_optionals() {
        let record = Record::new(1, 10, ValueType::Job, RecordType::Event, "8.6.0");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["valueType"], "JOB");
        assert!(json.get("operationReference").is_none());
        assert!(json.get("authorizations").is_none());
    }

    #[test]
    fn test_variable_name_only_for_variables() {
        let record = Record::new(1, 10, ValueType::Job, RecordType::Event, "8.6.0")
            .with_value(json!({ "name": "not-a-variable" }));
        assert_eq!(record.variable_name(), None);
    }

    #[test]
    fn test_written_at() {
        let record = Record::new(1, 10, ValueType::Job, RecordType::Event, "8.6.0")
            .with_timestamp(86_400_000);
        assert_eq!(record.written_at().to_rfc3339(), "1970-01-02T00:00:00+00:00");
    }
}
