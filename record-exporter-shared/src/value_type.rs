//! Value and record type classifications.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a value or record type name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {name}")]
pub struct UnknownTypeError {
    kind: &'static str,
    name: String,
}

/// The structural category of a record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Job,
    JobBatch,
    Deployment,
    DeploymentDistribution,
    Process,
    ProcessInstance,
    ProcessInstanceBatch,
    ProcessInstanceCreation,
    ProcessInstanceModification,
    ProcessInstanceMigration,
    ProcessInstanceResult,
    ProcessEvent,
    ProcessMessageSubscription,
    Incident,
    Message,
    MessageBatch,
    MessageSubscription,
    MessageStartEventSubscription,
    MessageCorrelation,
    Timer,
    Variable,
    VariableDocument,
    Error,
    Decision,
    DecisionRequirements,
    DecisionEvaluation,
    Escalation,
    Signal,
    SignalSubscription,
    ResourceDeletion,
    CommandDistribution,
    Form,
    UserTask,
    CompensationSubscription,
}

/// Expected write volume of a value type, used to size its indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    Low,
    High,
}

impl ValueType {
    /// Every known value type, in declaration order.
    pub const ALL: [ValueType; 34] = [
        ValueType::Job,
        ValueType::JobBatch,
        ValueType::Deployment,
        ValueType::DeploymentDistribution,
        ValueType::Process,
        ValueType::ProcessInstance,
        ValueType::ProcessInstanceBatch,
        ValueType::ProcessInstanceCreation,
        ValueType::ProcessInstanceModification,
        ValueType::ProcessInstanceMigration,
        ValueType::ProcessInstanceResult,
        ValueType::ProcessEvent,
        ValueType::ProcessMessageSubscription,
        ValueType::Incident,
        ValueType::Message,
        ValueType::MessageBatch,
        ValueType::MessageSubscription,
        ValueType::MessageStartEventSubscription,
        ValueType::MessageCorrelation,
        ValueType::Timer,
        ValueType::Variable,
        ValueType::VariableDocument,
        ValueType::Error,
        ValueType::Decision,
        ValueType::DecisionRequirements,
        ValueType::DecisionEvaluation,
        ValueType::Escalation,
        ValueType::Signal,
        ValueType::SignalSubscription,
        ValueType::ResourceDeletion,
        ValueType::CommandDistribution,
        ValueType::Form,
        ValueType::UserTask,
        ValueType::CompensationSubscription,
    ];

    /// The wire name, e.g. `PROCESS_INSTANCE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Job => "JOB",
            ValueType::JobBatch => "JOB_BATCH",
            ValueType::Deployment => "DEPLOYMENT",
            ValueType::DeploymentDistribution => "DEPLOYMENT_DISTRIBUTION",
            ValueType::Process => "PROCESS",
            ValueType::ProcessInstance => "PROCESS_INSTANCE",
            ValueType::ProcessInstanceBatch => "PROCESS_INSTANCE_BATCH",
            ValueType::ProcessInstanceCreation => "PROCESS_INSTANCE_CREATION",
            ValueType::ProcessInstanceModification => "PROCESS_INSTANCE_MODIFICATION",
            ValueType::ProcessInstanceMigration => "PROCESS_INSTANCE_MIGRATION",
            ValueType::ProcessInstanceResult => "PROCESS_INSTANCE_RESULT",
            ValueType::ProcessEvent => "PROCESS_EVENT",
            ValueType::ProcessMessageSubscription => "PROCESS_MESSAGE_SUBSCRIPTION",
            ValueType::Incident => "INCIDENT",
            ValueType::Message => "MESSAGE",
            ValueType::MessageBatch => "MESSAGE_BATCH",
            ValueType::MessageSubscription => "MESSAGE_SUBSCRIPTION",
            ValueType::MessageStartEventSubscription => "MESSAGE_START_EVENT_SUBSCRIPTION",
            ValueType::MessageCorrelation => "MESSAGE_CORRELATION",
            ValueType::Timer => "TIMER",
            ValueType::Variable => "VARIABLE",
            ValueType::VariableDocument => "VARIABLE_DOCUMENT",
            ValueType::Error => "ERROR",
            ValueType::Decision => "DECISION",
            ValueType::DecisionRequirements => "DECISION_REQUIREMENTS",
            ValueType::DecisionEvaluation => "DECISION_EVALUATION",
            ValueType::Escalation => "ESCALATION",
            ValueType::Signal => "SIGNAL",
            ValueType::SignalSubscription => "SIGNAL_SUBSCRIPTION",
            ValueType::ResourceDeletion => "RESOURCE_DELETION",
            ValueType::CommandDistribution => "COMMAND_DISTRIBUTION",
            ValueType::Form => "FORM",
            ValueType::UserTask => "USER_TASK",
            ValueType::CompensationSubscription => "COMPENSATION_SUBSCRIPTION",
        }
    }

    /// Lower-case, dash separated form used in index and template names,
    /// e.g. `process-instance`.
    pub fn index_fragment(&self) -> String {
        self.as_str().to_ascii_lowercase().replace('_', "-")
    }

    /// Process instance, job, variable, incident, message and timer style
    /// records dominate the write volume of a partition.
    pub fn traffic_class(&self) -> TrafficClass {
        match self {
            ValueType::ProcessInstance
            | ValueType::Job
            | ValueType::JobBatch
            | ValueType::Variable
            | ValueType::Incident
            | ValueType::Message
            | ValueType::MessageSubscription
            | ValueType::ProcessMessageSubscription
            | ValueType::Timer
            | ValueType::DecisionEvaluation => TrafficClass::High,
            _ => TrafficClass::Low,
        }
    }

    /// Whether the type is exported when the configuration says nothing
    /// about it. Batch commands and purely internal bookkeeping are off.
    pub fn is_enabled_by_default(&self) -> bool {
        !matches!(
            self,
            ValueType::JobBatch
                | ValueType::ProcessInstanceBatch
                | ValueType::MessageBatch
                | ValueType::DeploymentDistribution
                | ValueType::ProcessInstanceResult
                | ValueType::ProcessEvent
                | ValueType::CommandDistribution
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ValueType::ALL
            .iter()
            .copied()
            .find(|value_type| value_type.as_str() == normalized)
            .ok_or_else(|| UnknownTypeError {
                kind: "value type",
                name: s.to_string(),
            })
    }
}

/// The structural kind of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Event,
    Command,
    CommandRejection,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Event => "EVENT",
            RecordType::Command => "COMMAND",
            RecordType::CommandRejection => "COMMAND_REJECTION",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EVENT" => Ok(RecordType::Event),
            "COMMAND" => Ok(RecordType::Command),
            "COMMAND_REJECTION" | "REJECTION" => Ok(RecordType::CommandRejection),
            _ => Err(UnknownTypeError {
                kind: "record type",
                name: s.to_string(),
            }),
        }
    }
}
