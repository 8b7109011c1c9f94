//! Trigger resource types: event rules and schedules.

use serde::{Deserialize, Serialize};
use stepctl_core::Tags;

/// Enabled/disabled state shared by rules and schedules.
///
/// This is the field operators most often flip out-of-band, so it is the
/// one reconciliation preserves from live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    /// The trigger fires.
    #[default]
    Enabled,
    /// The trigger is paused.
    Disabled,
}

impl TriggerState {
    /// Parse a state string from the service.
    #[must_use]
    pub fn from_service(state: &str) -> Self {
        if state.eq_ignore_ascii_case("DISABLED") {
            Self::Disabled
        } else {
            Self::Enabled
        }
    }

    /// Service representation of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
        }
    }
}

/// Event bus the service reports for rules created without one.
pub const DEFAULT_EVENT_BUS: &str = "default";

/// Schedule group the service reports for schedules created without one.
pub const DEFAULT_SCHEDULE_GROUP: &str = "default";

/// A target of an event rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTarget {
    /// Target id, unique within the rule.
    pub id: String,
    /// Target ARN.
    pub arn: String,
    /// Role assumed to invoke the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// Constant JSON input passed to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// An event rule bound to the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Rule name.
    pub name: String,
    /// Rule ARN, unset until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Event bus name; the default bus when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_bus_name: Option<String>,
    /// Event pattern JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_pattern: Option<String>,
    /// Schedule expression (`rate(...)` / `cron(...)`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_expression: Option<String>,
    /// Role used by the rule itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// Enabled/disabled state.
    #[serde(default)]
    pub state: TriggerState,
    /// Targets invoked by the rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<RuleTarget>,
    /// Tags.
    #[serde(default)]
    pub tags: Tags,
}

/// Outcome of a target write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetWriteOutcome {
    /// Number of entries the service rejected.
    pub failed_entry_count: u32,
    /// Per-entry failure messages as `<id>: <message>`.
    pub failed_entries: Vec<String>,
}

/// Window within which a schedule may fire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexibleTimeWindow {
    /// `OFF` or `FLEXIBLE`.
    pub mode: String,
    /// Maximum window in minutes, when flexible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_window_in_minutes: Option<u32>,
}

impl FlexibleTimeWindow {
    /// A window that fires exactly on time.
    #[must_use]
    pub fn off() -> Self {
        Self {
            mode: "OFF".to_string(),
            maximum_window_in_minutes: None,
        }
    }
}

/// The target of a schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTarget {
    /// Target ARN.
    pub arn: String,
    /// Role assumed to invoke the target.
    pub role_arn: String,
    /// Constant JSON input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// A time-based schedule bound to the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Schedule name.
    pub name: String,
    /// Schedule group; the default group when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Schedule ARN, unset until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `at(...)`, `rate(...)` or `cron(...)` expression.
    pub schedule_expression: String,
    /// Timezone for the expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_expression_timezone: Option<String>,
    /// Flexible time window.
    #[serde(default)]
    pub flexible_time_window: FlexibleTimeWindow,
    /// Enabled/disabled state.
    #[serde(default)]
    pub state: TriggerState,
    /// Invocation target.
    #[serde(default)]
    pub target: ScheduleTarget,
    /// Tags.
    #[serde(default)]
    pub tags: Tags,
}

/// Entry of a schedule listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    /// Schedule name.
    pub name: String,
    /// Schedule group.
    pub group_name: Option<String>,
    /// Schedule ARN.
    pub arn: String,
    /// ARN of the schedule's target.
    pub target_arn: String,
    /// Enabled/disabled state.
    pub state: TriggerState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_state_parsing() {
        assert_eq!(TriggerState::from_service("DISABLED"), TriggerState::Disabled);
        assert_eq!(TriggerState::from_service("disabled"), TriggerState::Disabled);
        assert_eq!(TriggerState::from_service("ENABLED"), TriggerState::Enabled);
        assert_eq!(TriggerState::Disabled.as_str(), "DISABLED");
    }

    #[test]
    fn rule_deserializes_with_defaults() {
        let rule: Rule = serde_json::from_str(r#"{"name":"nightly"}"#).unwrap();
        assert_eq!(rule.state, TriggerState::Enabled);
        assert!(rule.targets.is_empty());
        assert!(rule.tags.is_empty());
    }
}
