//! # Record Exporter Shared
//!
//! Domain types shared by the record exporter crates: the immutable
//! [`Record`] read from a partition's event log, its value and record type
//! classifications, and semantic version handling.

pub mod record;
pub mod value_type;
pub mod version;

pub use record::Record;
pub use value_type::{RecordType, TrafficClass, UnknownTypeError, ValueType};
pub use version::{SemanticVersion, VersionParseError};
