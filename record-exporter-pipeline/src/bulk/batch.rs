//! Bulk batch builder.
//!
//! Accumulates index operations until the store client flushes them as a
//! single newline delimited bulk request.

use std::io::{self, Write};

use serde_json::{json, Value};
use tracing::debug;

use crate::bulk::compat;
use crate::errors::PipelineError;
use crate::sequence::RecordSequence;
use record_exporter_shared::Record;

/// Fields the engine carries for itself that never reach the store.
const TRANSPORT_ONLY_FIELDS: [&str; 1] = ["authorizations"];

/// Where a record is written: index, document id and routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BulkTarget {
    pub index: String,
    pub id: String,
    pub routing: String,
}

impl BulkTarget {
    pub fn new(index: impl Into<String>, id: impl Into<String>, routing: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            routing: routing.into(),
        }
    }

    /// Bulk action line for this target.
    fn action(&self) -> Value {
        json!({
            "index": {
                "_index": self.index,
                "_id": self.id,
                "routing": self.routing
            }
        })
    }
}

/// A target paired with the serialized document.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub target: BulkTarget,
    pub source: Vec<u8>,
}

/// Ordered bulk operations with their approximate memory footprint.
#[derive(Debug, Default)]
pub struct BulkBatch {
    operations: Vec<BulkOperation>,
    memory_usage_bytes: usize,
}

impl BulkBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `record` and append it under `target`.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The operation was appended
    /// * `Ok(false)` - `target` equals the last target; the record is a retry
    ///   of the last operation and nothing was appended
    /// * `Err(PipelineError)` - If the record cannot be serialized
    pub fn add(
        &mut self,
        target: BulkTarget,
        record: &Record,
        sequence: RecordSequence,
    ) -> Result<bool, PipelineError> {
        if self.last_target() == Some(&target) {
            debug!(id = %target.id, index = %target.index, "Skipping repeated bulk target");
            return Ok(false);
        }

        let source = Self::serialize(record, sequence)?;
        self.memory_usage_bytes += source.len();
        self.operations.push(BulkOperation { target, source });
        Ok(true)
    }

    fn serialize(record: &Record, sequence: RecordSequence) -> Result<Vec<u8>, PipelineError> {
        let mut document = match serde_json::to_value(record)? {
            Value::Object(document) => document,
            other => {
                return Err(PipelineError::serialization(format!(
                    "Record serialized to {} instead of an object",
                    other
                )))
            }
        };

        for field in TRANSPORT_ONLY_FIELDS {
            document.remove(field);
        }
        compat::strip_unknown_fields(&mut document, record.value_type, &record.broker_version);
        document.insert("sequence".to_string(), json!(sequence.sequence()));

        Ok(serde_json::to_vec(&document)?)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations.
    pub fn size(&self) -> usize {
        self.operations.len()
    }

    /// Sum of the serialized document sizes.
    pub fn memory_usage_bytes(&self) -> usize {
        self.memory_usage_bytes
    }

    pub fn last_target(&self) -> Option<&BulkTarget> {
        self.operations.last().map(|operation| &operation.target)
    }

    pub fn operations(&self) -> &[BulkOperation] {
        &self.operations
    }

    /// Write the batch as newline delimited JSON: an action line followed by
    /// the document line, for every operation in order.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        for operation in &self.operations {
            serde_json::to_writer(&mut *sink, &operation.target.action())?;
            sink.write_all(b"\n")?;
            sink.write_all(&operation.source)?;
            sink.write_all(b"\n")?;
        }
        Ok(())
    }

    /// The request body of the batch.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        let mut body = Vec::with_capacity(self.memory_usage_bytes + self.operations.len() * 128);
        self.write_to(&mut body)
            .map_err(|e| PipelineError::serialization(e.to_string()))?;
        Ok(body)
    }

    pub fn clear(&mut self) {
        self.operations.clear();
        self.memory_usage_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_exporter_shared::{RecordType, ValueType};

    fn record(position: i64) -> Record {
        Record::new(1, position, ValueType::Job, RecordType::Event, "8.6.0")
            .with_value(json!({ "type": "payment" }))
            .with_authorizations(json!({ "authorized_tenants": ["t1"] }))
    }

    fn target(position: i64) -> BulkTarget {
        BulkTarget::new("record-job-8.6.0_2024-06-10", format!("1-{}", position), "1")
    }

    #[test]
    fn test_add_appends_and_tracks_memory() {
        let mut batch = BulkBatch::new();

        assert!(batch.add(target(1), &record(1), RecordSequence::new(1, 1)).unwrap());
        assert!(batch.add(target(2), &record(2), RecordSequence::new(1, 2)).unwrap());

        assert_eq!(batch.size(), 2);
        let expected: usize = batch.operations().iter().map(|op| op.source.len()).sum();
        assert_eq!(batch.memory_usage_bytes(), expected);
        assert_eq!(batch.last_target(), Some(&target(2)));
    }

    #[test]
    fn test_repeated_target_is_collapsed() {
        let mut batch = BulkBatch::new();
        batch.add(target(1), &record(1), RecordSequence::new(1, 1)).unwrap();
        let memory = batch.memory_usage_bytes();

        let appended = batch
            .add(target(1), &record(1), RecordSequence::new(1, 2))
            .unwrap();

        assert!(!appended);
        assert_eq!(batch.size(), 1);
        assert_eq!(batch.memory_usage_bytes(), memory);
        let source: Value = serde_json::from_slice(&batch.operations()[0].source).unwrap();
        assert_eq!(source["sequence"], RecordSequence::new(1, 1).sequence());
    }

    #[test]
    fn test_only_consecutive_targets_collapse() {
        let mut batch = BulkBatch::new();
        batch.add(target(1), &record(1), RecordSequence::new(1, 1)).unwrap();
        batch.add(target(2), &record(2), RecordSequence::new(1, 2)).unwrap();

        assert!(batch.add(target(1), &record(1), RecordSequence::new(1, 3)).unwrap());
        assert_eq!(batch.size(), 3);
    }

    #[test]
    fn test_routing_is_part_of_target_equality() {
        let mut batch = BulkBatch::new();
        batch.add(target(1), &record(1), RecordSequence::new(1, 1)).unwrap();

        let rerouted = BulkTarget::new("record-job-8.6.0_2024-06-10", "1-1", "2");
        assert!(batch.add(rerouted, &record(1), RecordSequence::new(1, 2)).unwrap());
    }

    #[test]
    fn test_source_document() {
        let mut batch = BulkBatch::new();
        batch.add(target(5), &record(5), RecordSequence::new(1, 9)).unwrap();

        let source: Value = serde_json::from_slice(&batch.operations()[0].source).unwrap();

        assert_eq!(source["sequence"], (1_i64 << 51) | 9);
        assert_eq!(source["position"], 5);
        assert_eq!(source["valueType"], "JOB");
        assert_eq!(source["value"]["type"], "payment");
        assert!(source.get("authorizations").is_none());
    }

    #[test]
    fn test_source_document_for_older_broker() {
        let old = Record::new(1, 3, ValueType::Job, RecordType::Event, "8.5.1")
            .with_operation_reference(42)
            .with_value(json!({ "type": "payment", "jobListenerEventType": "START" }));
        let mut batch = BulkBatch::new();
        batch.add(target(3), &old, RecordSequence::new(1, 1)).unwrap();

        let source: Value = serde_json::from_slice(&batch.operations()[0].source).unwrap();

        assert!(source.get("operationReference").is_none());
        assert_eq!(source["value"], json!({ "type": "payment" }));
    }

    #[test]
    fn test_write_to_ndjson() {
        let mut batch = BulkBatch::new();
        batch.add(target(1), &record(1), RecordSequence::new(1, 1)).unwrap();
        batch.add(target(2), &record(2), RecordSequence::new(1, 2)).unwrap();

        let body = String::from_utf8(batch.to_bytes().unwrap()).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            action,
            json!({
                "index": {
                    "_index": "record-job-8.6.0_2024-06-10",
                    "_id": "1-1",
                    "routing": "1"
                }
            })
        );
        let second: Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(second["position"], 2);
    }

    #[test]
    fn test_clear() {
        let mut batch = BulkBatch::new();
        batch.add(target(1), &record(1), RecordSequence::new(1, 1)).unwrap();

        batch.clear();

        assert!(batch.is_empty());
        assert_eq!(batch.memory_usage_bytes(), 0);
        assert!(batch.last_target().is_none());
        assert!(batch.add(target(1), &record(1), RecordSequence::new(1, 1)).unwrap());
    }
}
