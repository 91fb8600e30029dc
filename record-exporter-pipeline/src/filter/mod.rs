//! Record filter.
//!
//! Decides, before a record is sequenced, whether it is exported at all:
//! by value type, by record type and, for variables, by name.

mod rules;

use std::collections::HashSet;

use record_exporter_shared::{Record, RecordType, ValueType};

pub use rules::{parse_rules, NameRule, VariableNameRules};

/// Which records are exported.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Value types exported in addition to the default ones.
    pub enabled_value_types: HashSet<ValueType>,
    /// Value types never exported. Wins over `enabled_value_types`.
    pub disabled_value_types: HashSet<ValueType>,
    pub event: bool,
    pub command: bool,
    pub rejection: bool,
    pub variable_names: VariableNameRules,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled_value_types: HashSet::new(),
            disabled_value_types: HashSet::new(),
            event: true,
            command: false,
            rejection: false,
            variable_names: VariableNameRules::default(),
        }
    }
}

impl FilterConfig {
    pub fn with_variable_names(mut self, variable_names: VariableNameRules) -> Self {
        self.variable_names = variable_names;
        self
    }

    pub fn with_disabled(mut self, value_type: ValueType) -> Self {
        self.disabled_value_types.insert(value_type);
        self
    }

    pub fn with_enabled(mut self, value_type: ValueType) -> Self {
        self.enabled_value_types.insert(value_type);
        self
    }
}

/// Pure predicate over records.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    config: FilterConfig,
}

impl RecordFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn accepts_value_type(&self, value_type: ValueType) -> bool {
        if self.config.disabled_value_types.contains(&value_type) {
            return false;
        }
        self.config.enabled_value_types.contains(&value_type) || value_type.is_enabled_by_default()
    }

    pub fn accepts_record_type(&self, record_type: RecordType) -> bool {
        match record_type {
            RecordType::Event => self.config.event,
            RecordType::Command => self.config.command,
            RecordType::CommandRejection => self.config.rejection,
        }
    }

    /// Whether `record` is exported.
    pub fn accepts(&self, record: &Record) -> bool {
        if !self.accepts_value_type(record.value_type)
            || !self.accepts_record_type(record.record_type)
        {
            return false;
        }

        if record.value_type != ValueType::Variable || self.config.variable_names.is_empty() {
            return true;
        }

        // Nameless variables are matched as the empty name
        self.config
            .variable_names
            .accepts(record.variable_name().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value_type: ValueType) -> Record {
        Record::new(1, 1, value_type, RecordType::Event, "8.6.0")
    }

    fn variable(name: &str) -> Record {
        event(ValueType::Variable).with_value(json!({ "name": name, "value": "1" }))
    }

    #[test]
    fn test_default_value_types() {
        let filter = RecordFilter::new(FilterConfig::default());

        assert!(filter.accepts(&event(ValueType::ProcessInstance)));
        assert!(filter.accepts(&event(ValueType::Job)));
        assert!(!filter.accepts(&event(ValueType::JobBatch)));
        assert!(!filter.accepts(&event(ValueType::ProcessInstanceBatch)));
        assert!(!filter.accepts(&event(ValueType::MessageBatch)));
    }

    #[test]
    fn test_value_type_overrides() {
        let filter = RecordFilter::new(
            FilterConfig::default()
                .with_enabled(ValueType::JobBatch)
                .with_disabled(ValueType::Timer)
                .with_enabled(ValueType::Timer),
        );

        assert!(filter.accepts(&event(ValueType::JobBatch)));
        assert!(!filter.accepts(&event(ValueType::Timer)));
        assert!(!filter.accepts_value_type(ValueType::Timer));
    }

    #[test]
    fn test_record_types() {
        let filter = RecordFilter::new(FilterConfig::default());
        let command = Record::new(1, 1, ValueType::Job, RecordType::Command, "8.6.0");
        let rejection = Record::new(1, 1, ValueType::Job, RecordType::CommandRejection, "8.6.0");

        assert!(!filter.accepts(&command));
        assert!(!filter.accepts(&rejection));

        let filter = RecordFilter::new(FilterConfig {
            command: true,
            rejection: true,
            event: false,
            ..FilterConfig::default()
        });
        assert!(filter.accepts(&command));
        assert!(filter.accepts(&rejection));
        assert!(!filter.accepts(&event(ValueType::Job)));
    }

    #[test]
    fn test_variable_name_inclusion() {
        let filter = RecordFilter::new(FilterConfig::default().with_variable_names(
            VariableNameRules::new(parse_rules(["included*", "allowed*"]), Vec::new()),
        ));

        assert!(filter.accepts(&variable("includedVariable")));
        assert!(!filter.accepts(&variable("excludedVariable")));
    }

    #[test]
    fn test_variable_name_rules_only_apply_to_variables() {
        let filter = RecordFilter::new(FilterConfig::default().with_variable_names(
            VariableNameRules::new(parse_rules(["included*"]), Vec::new()),
        ));

        let job = event(ValueType::Job).with_value(json!({ "name": "excluded" }));
        assert!(filter.accepts(&job));
    }

    #[test]
    fn test_variable_without_name() {
        let filter = RecordFilter::new(FilterConfig::default().with_variable_names(
            VariableNameRules::new(parse_rules(["included*"]), Vec::new()),
        ));

        assert!(!filter.accepts(&event(ValueType::Variable)));
    }
}
