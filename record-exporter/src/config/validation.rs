//! Validation of configuration values the store would otherwise reject late.

use chrono::format::{Item, StrftimeItems};
use regex::Regex;

use crate::ExporterError;
use record_exporter_pipeline::sequence::MAX_PARTITION_ID;

/// Characters OpenSearch forbids in index names, plus `_` which separates
/// the version from the date suffix.
const RESERVED_PREFIX_CHARS: &[char] = &[
    '\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':', '_',
];

const MINIMUM_AGE_PATTERN: &str = r"^[0-9]+[dhms]$";

/// `<digits>[dhms]`, e.g. `30d` or `12h`.
pub fn validate_minimum_age(minimum_age: &str) -> Result<(), ExporterError> {
    let regex = Regex::new(MINIMUM_AGE_PATTERN)
        .map_err(|e| ExporterError::config(format!("Invalid minimum age pattern: {}", e)))?;
    if regex.is_match(minimum_age) {
        Ok(())
    } else {
        Err(ExporterError::config(format!(
            "Retention minimum age '{}' must match <digits>[dhms], e.g. 30d",
            minimum_age
        )))
    }
}

/// The pattern must be a valid `chrono` format producing a non-empty suffix.
pub fn validate_date_pattern(pattern: &str) -> Result<(), ExporterError> {
    if pattern.is_empty() {
        return Err(ExporterError::config("Index date pattern must not be empty"));
    }
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ExporterError::config(format!(
            "Index date pattern '{}' is not a valid date format",
            pattern
        )));
    }
    Ok(())
}

pub fn validate_prefix(prefix: &str) -> Result<(), ExporterError> {
    if prefix.is_empty() {
        return Err(ExporterError::config("Index prefix must not be empty"));
    }
    if prefix != prefix.to_lowercase() {
        return Err(ExporterError::config(format!(
            "Index prefix '{}' must be lowercase",
            prefix
        )));
    }
    if prefix.starts_with(['-', '+', '.']) {
        return Err(ExporterError::config(format!(
            "Index prefix '{}' must not start with '-', '+' or '.'",
            prefix
        )));
    }
    if let Some(c) = prefix.chars().find(|c| RESERVED_PREFIX_CHARS.contains(c)) {
        return Err(ExporterError::config(format!(
            "Index prefix '{}' must not contain '{}'",
            prefix, c
        )));
    }
    Ok(())
}

/// Convert a signed setting, rejecting negative values.
pub fn non_negative(name: &str, value: i64) -> Result<u32, ExporterError> {
    u32::try_from(value).map_err(|_| {
        ExporterError::config(format!(
            "{} must be between 0 and {}, got {}",
            name,
            u32::MAX,
            value
        ))
    })
}

/// The partition id must fit into the bits above the record counter.
pub fn validate_partition_id(partition_id: i32) -> Result<(), ExporterError> {
    if (0..=MAX_PARTITION_ID).contains(&partition_id) {
        Ok(())
    } else {
        Err(ExporterError::config(format!(
            "EXPORTER_PARTITION_ID must be between 0 and {}, got {}",
            MAX_PARTITION_ID, partition_id
        )))
    }
}

/// Convert a signed setting, rejecting zero and negative values.
pub fn positive(name: &str, value: i64) -> Result<usize, ExporterError> {
    if value <= 0 {
        return Err(ExporterError::config(format!(
            "{} must be greater than 0, got {}",
            name, value
        )));
    }
    usize::try_from(value)
        .map_err(|_| ExporterError::config(format!("{} is too large: {}", name, value)))
}
