//! Index routing of records.

use std::fmt::Write;

use crate::bulk::BulkTarget;
use crate::errors::PipelineError;
use record_exporter_repository::IndexConfig;
use record_exporter_shared::{Record, SemanticVersion};

/// Computes where a record is written.
///
/// Records land in `<prefix>-<value-type>-<version>_<date>`, where the date
/// is the record's write time formatted with the configured pattern. The
/// document id is `<partition>-<position>` and records are routed by
/// partition.
#[derive(Debug, Clone)]
pub struct IndexRouter {
    index_config: IndexConfig,
    version: SemanticVersion,
}

impl IndexRouter {
    pub fn new(index_config: IndexConfig, version: SemanticVersion) -> Self {
        Self {
            index_config,
            version,
        }
    }

    pub fn target(&self, record: &Record) -> Result<BulkTarget, PipelineError> {
        Ok(BulkTarget::new(
            self.index_name(record)?,
            Self::document_id(record),
            record.partition_id.to_string(),
        ))
    }

    pub fn index_name(&self, record: &Record) -> Result<String, PipelineError> {
        let mut date_suffix = String::new();
        write!(
            date_suffix,
            "{}",
            record.written_at().format(&self.index_config.date_pattern)
        )
        .map_err(|_| {
            PipelineError::serialization(format!(
                "Invalid index date pattern: {}",
                self.index_config.date_pattern
            ))
        })?;

        Ok(self
            .index_config
            .index_name(record.value_type, &self.version, &date_suffix))
    }

    pub fn document_id(record: &Record) -> String {
        format!("{}-{}", record.partition_id, record.position)
    }
}
