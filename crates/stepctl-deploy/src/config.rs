//! Deploy configuration files.
//!
//! A configuration is a YAML (or JSON) document naming one state machine and
//! the triggers bound to it:
//!
//! ```yaml
//! required_version: ">=0.1.0"
//! state_machine:
//!   name: orders
//!   type: STANDARD
//!   definition: orders.asl.json
//!   role_arn: arn:aws:iam::123456789012:role/orders-sfn
//!   logging:
//!     level: ERROR
//!     destinations: [arn:aws:logs:us-east-1:123456789012:log-group:orders:*]
//!   tags:
//!     team: payments
//! trigger:
//!   event:
//!     - name: orders-on-upload
//!       event_pattern: {source: [aws.s3]}
//!       role_arn: arn:aws:iam::123456789012:role/events
//!   schedule:
//!     - name: orders-nightly
//!       schedule_expression: cron(0 3 * * ? *)
//!       role_arn: arn:aws:iam::123456789012:role/scheduler
//! keep_versions: 5
//! ```
//!
//! The definition path is relative to the configuration file. Definitions
//! written in YAML are converted to JSON on load.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use stepctl_core::Tags;
use stepctl_remote::{
    FlexibleTimeWindow, LogLevel, LoggingConfiguration, Rule, RuleTarget, Schedule, ScheduleTarget,
    StateMachine, StateMachineType, TracingConfiguration, TriggerState, DEFAULT_EVENT_BUS,
    DEFAULT_SCHEDULE_GROUP,
};
use tracing::debug;

use crate::error::{DeployError, Result};

/// Version of this tool, checked against `required_version`.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A loaded and validated deploy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Version constraint on this tool: `x.y.z`, `=x.y.z` or `>=x.y.z`.
    #[serde(default)]
    pub required_version: Option<String>,

    /// The state machine.
    pub state_machine: StateMachineConfig,

    /// Triggers bound to the state machine's `current` alias.
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Versions to keep when purging after a deploy.
    #[serde(default)]
    pub keep_versions: Option<usize>,

    /// Endpoint of the remote control planes.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

/// State machine section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateMachineConfig {
    /// Resource name.
    pub name: String,

    /// Workflow type.
    #[serde(rename = "type", default)]
    pub machine_type: StateMachineType,

    /// Path of the definition file, relative to the configuration file.
    pub definition: PathBuf,

    /// Execution role.
    pub role_arn: String,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tracing configuration.
    #[serde(default)]
    pub tracing: TracingConfiguration,

    /// Tags applied to the state machine.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Definition JSON, read from `definition` on load.
    #[serde(skip)]
    pub definition_body: String,
}

/// Logging section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Level: `ALL`, `ERROR`, `FATAL` or `OFF`.
    #[serde(default)]
    pub level: LogLevel,
    /// Include execution input and output.
    #[serde(default)]
    pub include_execution_data: bool,
    /// Log group ARNs.
    #[serde(default)]
    pub destinations: Vec<String>,
}

/// Trigger section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// Event rules.
    #[serde(default)]
    pub event: Vec<EventTriggerConfig>,
    /// Schedules.
    #[serde(default)]
    pub schedule: Vec<ScheduleTriggerConfig>,
}

/// An event rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventTriggerConfig {
    /// Rule name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Event pattern, as a mapping or a JSON string.
    #[serde(default)]
    pub event_pattern: Option<Value>,
    /// Schedule expression, instead of an event pattern.
    #[serde(default)]
    pub schedule_expression: Option<String>,
    /// Event bus; the default bus when unset.
    #[serde(default)]
    pub event_bus_name: Option<String>,
    /// Role the rule assumes to start executions.
    #[serde(default)]
    pub role_arn: Option<String>,
    /// Target id; the state machine name when unset.
    #[serde(default)]
    pub target_id: Option<String>,
    /// Constant JSON input.
    #[serde(default)]
    pub input: Option<String>,
    /// Initial state. Live state wins for existing rules.
    #[serde(default)]
    pub state: TriggerState,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleTriggerConfig {
    /// Schedule name.
    pub name: String,
    /// Schedule group; the default group when unset.
    #[serde(default)]
    pub group_name: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// `at(...)`, `rate(...)` or `cron(...)` expression.
    pub schedule_expression: String,
    /// Timezone of the expression.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Flexible time window; off when unset.
    #[serde(default)]
    pub flexible_time_window: Option<FlexibleWindowConfig>,
    /// Role the scheduler assumes to start executions.
    pub role_arn: String,
    /// Initial state. Live state wins for existing schedules.
    #[serde(default)]
    pub state: TriggerState,
    /// Constant JSON input.
    #[serde(default)]
    pub input: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Flexible time window of a schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlexibleWindowConfig {
    /// `OFF` or `FLEXIBLE`.
    #[serde(default = "FlexibleWindowConfig::default_mode")]
    pub mode: String,
    /// Maximum window in minutes; required when flexible.
    #[serde(default)]
    pub maximum_window_in_minutes: Option<u32>,
}

impl FlexibleWindowConfig {
    fn default_mode() -> String {
        "FLEXIBLE".to_string()
    }
}

impl DeployConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] if a file cannot be read and
    /// [`DeployError::Config`] if the content is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        debug!(path = %path.display(), "Loading configuration");
        Self::parse(&text, base).map_err(|e| match e {
            DeployError::Config(msg) => DeployError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse and validate configuration text, resolving the definition
    /// against `base_dir`.
    ///
    /// # Errors
    ///
    /// See [`DeployConfig::load`].
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self =
            serde_yaml::from_str(text).map_err(|e| DeployError::Config(e.to_string()))?;
        config.validate()?;

        let definition_path = base_dir.join(&config.state_machine.definition);
        config.state_machine.definition_body = read_definition(&definition_path)?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(constraint) = &self.required_version {
            check_required_version(constraint, TOOL_VERSION)?;
        }

        let sm = &self.state_machine;
        require_non_empty("state_machine.name", &sm.name)?;
        require_non_empty("state_machine.role_arn", &sm.role_arn)?;
        if let Some(url) = &self.endpoint_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return invalid(format!("endpoint_url must be an http(s) URL, got {url}"));
            }
        }

        let mut seen = HashSet::new();
        for event in &self.trigger.event {
            require_non_empty("trigger.event.name", &event.name)?;
            if !seen.insert(event.name.as_str()) {
                return invalid(format!("duplicate event trigger {}", event.name));
            }
            match (&event.event_pattern, &event.schedule_expression) {
                (Some(_), None) => {
                    event_pattern_json(event)?;
                }
                (None, Some(expression)) => {
                    require_non_empty("trigger.event.schedule_expression", expression)?;
                }
                _ => {
                    return invalid(format!(
                        "event trigger {} needs exactly one of event_pattern or schedule_expression",
                        event.name
                    ))
                }
            }
        }

        let mut seen = HashSet::new();
        for schedule in &self.trigger.schedule {
            require_non_empty("trigger.schedule.name", &schedule.name)?;
            require_non_empty("trigger.schedule.schedule_expression", &schedule.schedule_expression)?;
            require_non_empty("trigger.schedule.role_arn", &schedule.role_arn)?;
            if !seen.insert((schedule.group_name.as_deref(), schedule.name.as_str())) {
                return invalid(format!("duplicate schedule trigger {}", schedule.name));
            }
            if let Some(window) = &schedule.flexible_time_window {
                match (window.mode.as_str(), window.maximum_window_in_minutes) {
                    ("OFF", _) | ("FLEXIBLE", Some(_)) => {}
                    ("FLEXIBLE", None) => {
                        return invalid(format!(
                            "schedule {} has a flexible window without maximum_window_in_minutes",
                            schedule.name
                        ))
                    }
                    (mode, _) => {
                        return invalid(format!(
                            "schedule {} has unknown flexible window mode {mode}",
                            schedule.name
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    /// The desired state machine, carrying the ownership tag.
    #[must_use]
    pub fn state_machine(&self) -> StateMachine {
        let sm = &self.state_machine;
        StateMachine {
            name: sm.name.clone(),
            definition: sm.definition_body.clone(),
            role_arn: sm.role_arn.clone(),
            machine_type: sm.machine_type,
            logging: LoggingConfiguration {
                level: sm.logging.level,
                include_execution_data: sm.logging.include_execution_data,
                destinations: sm.logging.destinations.clone(),
            },
            tracing: sm.tracing,
            tags: owned_tags(&sm.tags),
            ..Default::default()
        }
    }

    /// Declared event rules, each with a single unbound target.
    #[must_use]
    pub fn rules(&self) -> Vec<Rule> {
        self.trigger
            .event
            .iter()
            .map(|event| Rule {
                name: event.name.clone(),
                arn: None,
                description: event.description.clone(),
                event_bus_name: Some(
                    event
                        .event_bus_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_EVENT_BUS.to_string()),
                ),
                // validated on load
                event_pattern: event_pattern_json(event).ok().flatten(),
                schedule_expression: event.schedule_expression.clone(),
                role_arn: None,
                state: event.state,
                targets: vec![RuleTarget {
                    id: event
                        .target_id
                        .clone()
                        .unwrap_or_else(|| self.state_machine.name.clone()),
                    arn: String::new(),
                    role_arn: event.role_arn.clone(),
                    input: event.input.clone(),
                }],
                tags: owned_tags(&event.tags),
            })
            .collect()
    }

    /// Declared schedules with an unbound target.
    #[must_use]
    pub fn schedules(&self) -> Vec<Schedule> {
        self.trigger
            .schedule
            .iter()
            .map(|s| Schedule {
                name: s.name.clone(),
                group_name: Some(
                    s.group_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SCHEDULE_GROUP.to_string()),
                ),
                arn: None,
                description: s.description.clone(),
                schedule_expression: s.schedule_expression.clone(),
                schedule_expression_timezone: s.timezone.clone(),
                flexible_time_window: s.flexible_time_window.as_ref().map_or_else(
                    FlexibleTimeWindow::off,
                    |w| FlexibleTimeWindow {
                        mode: w.mode.clone(),
                        maximum_window_in_minutes: w.maximum_window_in_minutes,
                    },
                ),
                state: s.state,
                target: ScheduleTarget {
                    arn: String::new(),
                    role_arn: s.role_arn.clone(),
                    input: s.input.clone(),
                },
                tags: owned_tags(&s.tags),
            })
            .collect()
    }
}

fn invalid<T>(message: String) -> Result<T> {
    Err(DeployError::Config(message))
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return invalid(format!("{field} must not be empty"));
    }
    Ok(())
}

fn owned_tags(tags: &BTreeMap<String, String>) -> Tags {
    Tags::from(tags.clone()).with_ownership()
}

/// Compact JSON text of an event pattern, accepting a mapping or a string.
fn event_pattern_json(event: &EventTriggerConfig) -> Result<Option<String>> {
    let Some(pattern) = &event.event_pattern else {
        return Ok(None);
    };
    let value = match pattern {
        Value::String(text) => serde_json::from_str(text).map_err(|e| {
            DeployError::Config(format!("event trigger {}: invalid event_pattern: {e}", event.name))
        })?,
        other => other.clone(),
    };
    if !value.is_object() {
        return invalid(format!("event trigger {}: event_pattern must be an object", event.name));
    }
    Ok(Some(value.to_string()))
}

fn read_definition(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        DeployError::Config(format!("cannot read definition {}: {e}", path.display()))
    })?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let value: Value = if is_yaml {
        serde_yaml::from_str(&text).map_err(|e| {
            DeployError::Config(format!("invalid definition {}: {e}", path.display()))
        })?
    } else {
        serde_json::from_str(&text).map_err(|e| {
            DeployError::Config(format!("invalid definition {}: {e}", path.display()))
        })?
    };
    if !value.is_object() {
        return invalid(format!("definition {} must be a JSON object", path.display()));
    }
    // JSON files are deployed verbatim so that versions diff as written
    Ok(if is_yaml { value.to_string() } else { text })
}

fn parse_semver(text: &str) -> Option<(u64, u64, u64)> {
    let mut parts = text.trim().trim_start_matches('v').splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    // ignore pre-release and build suffixes
    let patch = parts
        .next()
        .unwrap_or("0")
        .split(['-', '+'])
        .next()?
        .parse()
        .ok()?;
    Some((major, minor, patch))
}

/// Check `version` against a `x.y.z`, `=x.y.z` or `>=x.y.z` constraint.
///
/// # Errors
///
/// Returns [`DeployError::Config`] if the constraint is malformed or unmet.
pub fn check_required_version(constraint: &str, version: &str) -> Result<()> {
    let constraint = constraint.trim();
    let (at_least, wanted) = match constraint.strip_prefix(">=") {
        Some(rest) => (true, rest),
        None => (false, constraint.strip_prefix('=').unwrap_or(constraint)),
    };
    let Some(wanted) = parse_semver(wanted) else {
        return invalid(format!("invalid required_version {constraint}"));
    };
    let Some(actual) = parse_semver(version) else {
        return invalid(format!("invalid tool version {version}"));
    };

    let ok = if at_least { actual >= wanted } else { actual == wanted };
    if !ok {
        return invalid(format!(
            "stepctl {version} does not satisfy required_version {constraint}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DEFINITION: &str = r#"{"StartAt":"Done","States":{"Done":{"Type":"Succeed"}}}"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const FULL: &str = r#"
state_machine:
  name: orders
  type: EXPRESS
  definition: orders.asl.json
  role_arn: arn:aws:iam::123456789012:role/sfn
  logging:
    level: ERROR
    include_execution_data: true
    destinations: ["arn:aws:logs:us-east-1:123456789012:log-group:orders:*"]
  tracing:
    enabled: true
  tags:
    team: payments
trigger:
  event:
    - name: on-upload
      event_pattern:
        source: [aws.s3]
      role_arn: arn:aws:iam::123456789012:role/events
    - name: hourly-rule
      schedule_expression: rate(1 hour)
      target_id: main
      state: DISABLED
  schedule:
    - name: nightly
      schedule_expression: cron(0 3 * * ? *)
      timezone: Europe/Berlin
      flexible_time_window:
        maximum_window_in_minutes: 15
      role_arn: arn:aws:iam::123456789012:role/scheduler
      input: '{"mode":"nightly"}'
keep_versions: 3
endpoint_url: http://localhost:4566
"#;

    #[test]
    fn loads_full_configuration() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "orders.asl.json", DEFINITION);
        let path = write(dir.path(), "stepctl.yaml", FULL);

        let config = DeployConfig::load(&path).unwrap();
        assert_eq!(config.keep_versions, Some(3));
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));

        let sm = config.state_machine();
        assert_eq!(sm.name, "orders");
        assert_eq!(sm.machine_type, StateMachineType::Express);
        assert_eq!(sm.definition, DEFINITION);
        assert_eq!(sm.logging.level, LogLevel::Error);
        assert!(sm.tracing.enabled);
        assert_eq!(sm.tags.get("team"), Some("payments"));
        assert!(sm.tags.is_managed());

        let rules = config.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].event_pattern.as_deref(), Some(r#"{"source":["aws.s3"]}"#));
        assert_eq!(rules[0].targets[0].id, "orders");
        assert_eq!(rules[1].targets[0].id, "main");
        assert_eq!(rules[1].state, TriggerState::Disabled);
        assert!(rules.iter().all(|r| r.tags.is_managed()));
        assert!(rules
            .iter()
            .all(|r| r.event_bus_name.as_deref() == Some(DEFAULT_EVENT_BUS)));

        let schedules = config.schedules();
        assert_eq!(schedules[0].flexible_time_window.mode, "FLEXIBLE");
        assert_eq!(schedules[0].flexible_time_window.maximum_window_in_minutes, Some(15));
        assert_eq!(schedules[0].schedule_expression_timezone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(schedules[0].target.input.as_deref(), Some(r#"{"mode":"nightly"}"#));
        assert_eq!(schedules[0].group_name.as_deref(), Some(DEFAULT_SCHEDULE_GROUP));
    }

    #[test]
    fn json_configuration_and_yaml_definition() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "def.yaml",
            "StartAt: Done\nStates:\n  Done:\n    Type: Succeed\n",
        );
        let path = write(
            dir.path(),
            "stepctl.json",
            r#"{"state_machine": {"name": "orders", "definition": "def.yaml", "role_arn": "r"}}"#,
        );

        let config = DeployConfig::load(&path).unwrap();
        let definition: Value = serde_json::from_str(&config.state_machine().definition).unwrap();
        assert_eq!(definition["StartAt"], "Done");
        assert!(config.rules().is_empty());
    }

    #[test]
    fn rejects_invalid_configurations() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "d.json", DEFINITION);

        let cases = [
            "state_machine: {name: '', definition: d.json, role_arn: r}",
            "state_machine: {name: x, definition: d.json, role_arn: r, unknown: 1}",
            "state_machine: {name: x, definition: missing.json, role_arn: r}",
            "state_machine: {name: x, definition: d.json, role_arn: r}\nendpoint_url: localhost",
            "state_machine: {name: x, definition: d.json, role_arn: r}\n\
             trigger: {event: [{name: a}]}",
            "state_machine: {name: x, definition: d.json, role_arn: r}\n\
             trigger: {event: [{name: a, event_pattern: '[1]'}]}",
            "state_machine: {name: x, definition: d.json, role_arn: r}\n\
             trigger: {event: [{name: a, schedule_expression: rate(1 day)}, \
             {name: a, schedule_expression: rate(2 days)}]}",
            "state_machine: {name: x, definition: d.json, role_arn: r}\n\
             trigger: {schedule: [{name: s, schedule_expression: rate(1 day), role_arn: r, \
             flexible_time_window: {mode: FLEXIBLE}}]}",
            "required_version: '>=999.0.0'\n\
             state_machine: {name: x, definition: d.json, role_arn: r}",
        ];
        for case in cases {
            let err = DeployConfig::parse(case, dir.path()).unwrap_err();
            assert!(matches!(err, DeployError::Config(_)), "{case}: {err}");
        }
    }

    #[test]
    fn required_version_constraints() {
        assert!(check_required_version(">=0.1.0", "0.1.0").is_ok());
        assert!(check_required_version(">=0.1", "1.0.0").is_ok());
        assert!(check_required_version("=0.2.0", "0.2.0").is_ok());
        assert!(check_required_version("0.2.0", "0.2.1").is_err());
        assert!(check_required_version(">=1.2.3", "1.2.2").is_err());
        assert!(check_required_version(">=abc", "1.0.0").is_err());
    }
}
