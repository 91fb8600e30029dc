//! Record sequences.
//!
//! A sequence orders the records of one value type across partitions:
//! the partition id occupies the bits above the lowest 51, the per value
//! type counter the 51 bits below.

use std::collections::HashMap;

use crate::errors::PipelineError;
use crate::metadata::ExporterMetadata;
use record_exporter_shared::ValueType;

/// Bits reserved for the counter.
pub const COUNTER_BITS: u32 = 51;

/// Largest counter that fits into a sequence.
pub const MAX_COUNTER: i64 = (1 << COUNTER_BITS) - 1;

/// Largest partition id that fits above the counter of a positive sequence.
pub const MAX_PARTITION_ID: i32 = (1 << (63 - COUNTER_BITS)) - 1;

/// A partition id paired with a per value type counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordSequence {
    partition_id: i32,
    counter: i64,
}

impl RecordSequence {
    pub fn new(partition_id: i32, counter: i64) -> Self {
        Self {
            partition_id,
            counter,
        }
    }

    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    /// `(partition_id << 51) | counter`
    pub fn sequence(&self) -> i64 {
        (i64::from(self.partition_id) << COUNTER_BITS) | self.counter
    }
}

/// Counters handed out per value type for one partition.
///
/// Not thread safe; the exporter serializes access.
#[derive(Debug, Clone)]
pub struct RecordCounters {
    partition_id: i32,
    counters: HashMap<ValueType, i64>,
}

impl RecordCounters {
    pub fn new(partition_id: i32) -> Self {
        Self {
            partition_id,
            counters: HashMap::new(),
        }
    }

    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    /// Seed the counters from persisted metadata, replacing any in memory.
    pub fn restore(&mut self, metadata: &ExporterMetadata) {
        self.counters = metadata
            .counters()
            .iter()
            .map(|(value_type, counter)| (*value_type, *counter))
            .collect();
    }

    /// Hand out the next sequence of `value_type`.
    pub fn next(&mut self, value_type: ValueType) -> Result<RecordSequence, PipelineError> {
        let current = self.current(value_type);
        if current >= MAX_COUNTER {
            return Err(PipelineError::SequenceOverflow {
                value_type,
                counter: current,
            });
        }

        let counter = current + 1;
        self.counters.insert(value_type, counter);
        Ok(RecordSequence::new(self.partition_id, counter))
    }

    /// Undo the last `next` of `value_type`.
    pub fn rollback(&mut self, value_type: ValueType) {
        if let Some(counter) = self.counters.get_mut(&value_type) {
            *counter -= 1;
            if *counter <= 0 {
                self.counters.remove(&value_type);
            }
        }
    }

    /// Last counter handed out for `value_type`, 0 if none.
    pub fn current(&self, value_type: ValueType) -> i64 {
        self.counters.get(&value_type).copied().unwrap_or(0)
    }

    pub fn to_metadata(&self) -> ExporterMetadata {
        self.counters
            .iter()
            .fold(ExporterMetadata::new(), |metadata, (value_type, counter)| {
                metadata.with_counter(*value_type, *counter)
            })
    }
}
