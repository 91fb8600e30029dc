//! Exporter metadata persisted alongside the acknowledged position.
//!
//! Wire format: `{"recordCountersByValueType": {"<VALUE_TYPE>": <counter>}}`
//! where the counter is the last one handed out for that value type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::PipelineError;
use crate::sequence::MAX_COUNTER;
use record_exporter_shared::ValueType;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    #[serde(default)]
    record_counters_by_value_type: BTreeMap<String, i64>,
}

/// Per value type record counters as last committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExporterMetadata {
    counters: BTreeMap<ValueType, i64>,
}

impl ExporterMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter(mut self, value_type: ValueType, counter: i64) -> Self {
        self.counters.insert(value_type, counter);
        self
    }

    /// Last counter handed out for `value_type`, if any.
    pub fn counter(&self, value_type: ValueType) -> Option<i64> {
        self.counters.get(&value_type).copied()
    }

    pub fn counters(&self) -> &BTreeMap<ValueType, i64> {
        &self.counters
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        let document = MetadataDocument {
            record_counters_by_value_type: self
                .counters
                .iter()
                .map(|(value_type, counter)| (value_type.as_str().to_string(), *counter))
                .collect(),
        };
        serde_json::to_vec(&document).map_err(|e| PipelineError::metadata(e.to_string()))
    }

    /// Parse persisted metadata. Counters of unknown value types are dropped,
    /// counters outside `0..=MAX_COUNTER` are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        let document: MetadataDocument =
            serde_json::from_slice(bytes).map_err(|e| PipelineError::metadata(e.to_string()))?;

        let mut counters = BTreeMap::new();
        for (name, counter) in document.record_counters_by_value_type {
            match name.parse::<ValueType>() {
                Ok(value_type) => {
                    if !(0..=MAX_COUNTER).contains(&counter) {
                        return Err(PipelineError::metadata(format!(
                            "Counter of {} out of range: {}",
                            value_type, counter
                        )));
                    }
                    counters.insert(value_type, counter);
                }
                Err(_) => {
                    warn!(value_type = %name, counter, "Ignoring counter of unknown value type");
                }
            }
        }

        Ok(Self { counters })
    }
}
