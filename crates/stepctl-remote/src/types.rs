//! State machine, version, alias and execution types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stepctl_core::Tags;

/// Lifecycle status of a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateMachineStatus {
    /// Ready to run executions.
    Active,
    /// Deletion in progress.
    Deleting,
    /// Status not reported or not recognised.
    #[default]
    Unknown,
}

impl StateMachineStatus {
    /// Parse a status string from the service.
    #[must_use]
    pub fn from_service(status: &str) -> Self {
        match status {
            "ACTIVE" => Self::Active,
            "DELETING" => Self::Deleting,
            _ => Self::Unknown,
        }
    }

    /// Service representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Deleting => "DELETING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Workflow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateMachineType {
    /// Long-running, exactly-once workflows.
    #[default]
    Standard,
    /// High-volume, short-lived workflows.
    Express,
}

/// Execution history logging level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Log everything.
    All,
    /// Log errors only.
    Error,
    /// Log fatal failures only.
    Fatal,
    /// Logging disabled.
    #[default]
    Off,
}

/// Logging configuration of a state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfiguration {
    /// Logging level.
    #[serde(default)]
    pub level: LogLevel,
    /// Whether execution input/output is included in log events.
    #[serde(default)]
    pub include_execution_data: bool,
    /// Log group ARNs that receive the events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<String>,
}

/// X-Ray tracing configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfiguration {
    /// Whether tracing is enabled.
    #[serde(default)]
    pub enabled: bool,
}

/// A state machine: identity, mutable configuration and lifecycle status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachine {
    /// Resource name.
    pub name: String,
    /// Unqualified ARN, unset until the resource exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Raw definition payload (Amazon States Language JSON).
    pub definition: String,
    /// IAM role assumed by executions.
    pub role_arn: String,
    /// Workflow type.
    #[serde(default, rename = "type")]
    pub machine_type: StateMachineType,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfiguration,
    /// Tracing configuration.
    #[serde(default)]
    pub tracing: TracingConfiguration,
    /// Resource tags.
    #[serde(default)]
    pub tags: Tags,
    /// Lifecycle status, as last described.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StateMachineStatus>,
    /// When the resource (or version) was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    /// Revision identifier of the configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    /// Version description, when describing a version ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StateMachine {
    /// Whether the resource is being deleted.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.status == Some(StateMachineStatus::Deleting)
    }

    /// Whether the resource is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == Some(StateMachineStatus::Active)
    }
}

/// Entry of a state machine listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachineListItem {
    /// Resource name.
    pub name: String,
    /// Unqualified ARN.
    pub arn: String,
    /// Creation time.
    pub creation_date: Option<DateTime<Utc>>,
}

/// Result of a create/update call that publishes a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedVersion {
    /// Unqualified ARN of the state machine.
    pub state_machine_arn: String,
    /// Version-qualified ARN of the published version.
    pub version_arn: String,
    /// Creation or update timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Entry of a version listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionListItem {
    /// Version-qualified ARN.
    pub arn: String,
    /// Creation time.
    pub creation_date: Option<DateTime<Utc>>,
}

/// Entry of an alias listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasListItem {
    /// Alias-qualified ARN.
    pub arn: String,
    /// Creation time.
    pub creation_date: Option<DateTime<Utc>>,
}

/// One weighted entry of an alias routing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    /// Version-qualified ARN.
    pub version_arn: String,
    /// Percentage of traffic, 0..=100.
    pub weight: u8,
}

impl RoutingEntry {
    /// A single entry carrying all traffic.
    #[must_use]
    pub fn full(version_arn: impl Into<String>) -> Self {
        Self {
            version_arn: version_arn.into(),
            weight: 100,
        }
    }
}

/// A named, mutable pointer to one or more versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Alias name.
    pub name: String,
    /// Alias-qualified ARN.
    pub arn: String,
    /// Optional description.
    pub description: Option<String>,
    /// Weighted routing table.
    pub routing: Vec<RoutingEntry>,
    /// Creation time.
    pub creation_date: Option<DateTime<Utc>>,
    /// Last update time.
    pub update_date: Option<DateTime<Utc>>,
}

/// Status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Still running.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed with an error.
    Failed,
    /// Exceeded its timeout.
    TimedOut,
    /// Stopped by a caller.
    Aborted,
    /// Waiting on a redrive.
    PendingRedrive,
}

impl ExecutionStatus {
    /// Parse a status string from the service.
    #[must_use]
    pub fn from_service(status: &str) -> Option<Self> {
        match status {
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "TIMED_OUT" => Some(Self::TimedOut),
            "ABORTED" => Some(Self::Aborted),
            "PENDING_REDRIVE" => Some(Self::PendingRedrive),
            _ => None,
        }
    }

    /// Whether the execution has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running | Self::PendingRedrive)
    }

    /// Whether the execution finished unsuccessfully.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut | Self::Aborted)
    }
}

/// An execution that was just started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedExecution {
    /// Execution ARN.
    pub execution_arn: String,
    /// Start timestamp.
    pub start_date: DateTime<Utc>,
}

/// Execution details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution ARN.
    pub execution_arn: String,
    /// Execution name.
    pub name: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// Start timestamp.
    pub start_date: Option<DateTime<Utc>>,
    /// Stop timestamp.
    pub stop_date: Option<DateTime<Utc>>,
    /// JSON output, when succeeded.
    pub output: Option<String>,
    /// Error name, when failed.
    pub error: Option<String>,
    /// Error cause, when failed.
    pub cause: Option<String>,
}

/// One event of an execution history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Sequential event id.
    pub id: u64,
    /// Event type, e.g. `TaskStateEntered`.
    pub event_type: String,
    /// When the event happened.
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_service() {
        assert_eq!(
            StateMachineStatus::from_service("ACTIVE"),
            StateMachineStatus::Active
        );
        assert_eq!(
            StateMachineStatus::from_service("DELETING"),
            StateMachineStatus::Deleting
        );
        assert_eq!(
            StateMachineStatus::from_service("weird"),
            StateMachineStatus::Unknown
        );
    }

    #[test]
    fn execution_status_states() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(!ExecutionStatus::Succeeded.is_failure());
        assert!(ExecutionStatus::TimedOut.is_failure());
        assert_eq!(
            ExecutionStatus::from_service("ABORTED"),
            Some(ExecutionStatus::Aborted)
        );
        assert_eq!(ExecutionStatus::from_service("nope"), None);
    }

    #[test]
    fn state_machine_serializes_type_field() {
        let sm = StateMachine {
            name: "orders".into(),
            machine_type: StateMachineType::Express,
            ..Default::default()
        };
        let json = serde_json::to_value(&sm).unwrap();
        assert_eq!(json["type"], "EXPRESS");
        assert!(json.get("arn").is_none());
    }
}
