//! An in-memory cloud for testing without remote services.
//!
//! [`FakeCloud`] implements every port. It assigns strictly increasing version
//! numbers, refuses to delete versions still referenced by an alias, and
//! pages every listing so that pagination paths are exercised. Tests can
//! script describe failures, transient statuses, delete conflicts, rejected
//! targets and execution outcomes, and inspect a log of mutating calls.

use std::collections::{BTreeMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use stepctl_core::{arn, Qualifier, Tags};

use crate::error::{RemoteError, Result};
use crate::events::{
    Rule, RuleTarget, Schedule, ScheduleSummary, TargetWriteOutcome, DEFAULT_EVENT_BUS,
    DEFAULT_SCHEDULE_GROUP,
};
use crate::paginate::Page;
use crate::ports::{ExecutionControl, RuleApi, ScheduleApi, StateMachineCatalog, VersionRegistry};
use crate::types::{
    Alias, AliasListItem, Execution, ExecutionStatus, HistoryEvent, PublishedVersion, RoutingEntry,
    StartedExecution, StateMachine, StateMachineListItem, StateMachineStatus, VersionListItem,
};

/// Items returned per page by every fake listing.
pub const PAGE_SIZE: usize = 2;

const ACCOUNT: &str = "us-east-1:123456789012";

/// Unqualified ARN the fake assigns to a state machine name.
#[must_use]
pub fn state_machine_arn(name: &str) -> String {
    format!("arn:aws:states:{ACCOUNT}:stateMachine:{name}")
}

/// ARN the fake assigns to a rule name.
#[must_use]
pub fn rule_arn(name: &str) -> String {
    format!("arn:aws:events:{ACCOUNT}:rule/{name}")
}

/// ARN the fake assigns to a schedule.
#[must_use]
pub fn schedule_arn(group_name: Option<&str>, name: &str) -> String {
    format!(
        "arn:aws:scheduler:{ACCOUNT}:schedule/{}/{name}",
        group_name.unwrap_or(DEFAULT_SCHEDULE_GROUP)
    )
}

/// A fake remote control plane holding all state in memory.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    clock: i64,
    machines: BTreeMap<String, FakeMachine>,
    rules: BTreeMap<String, Rule>,
    schedules: BTreeMap<String, Schedule>,
    executions: BTreeMap<String, FakeExecution>,
    pending_statuses: VecDeque<StateMachineStatus>,
    describe_failures: VecDeque<RemoteError>,
    delete_conflicts: VecDeque<Vec<String>>,
    rejected_targets: HashSet<String>,
    execution_script: Option<(ExecutionStatus, u32)>,
    calls: Vec<String>,
}

struct FakeMachine {
    config: StateMachine,
    versions: BTreeMap<u64, StateMachine>,
    next_version: u64,
    aliases: BTreeMap<String, Alias>,
}

struct FakeExecution {
    execution: Execution,
    final_status: ExecutionStatus,
    polls_remaining: u32,
}

impl FakeState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        DateTime::from_timestamp(1_700_000_000 + self.clock, 0).unwrap_or_default()
    }

    fn record(&mut self, call: impl Into<String>) {
        self.calls.push(call.into());
    }

    fn machine(&self, arn: &str) -> Result<&FakeMachine> {
        self.machines
            .get(arn::unqualify(arn))
            .ok_or_else(|| RemoteError::NotFound(format!("State Machine Does Not Exist: {arn}")))
    }

    fn machine_mut(&mut self, arn: &str) -> Result<&mut FakeMachine> {
        self.machines
            .get_mut(arn::unqualify(arn))
            .ok_or_else(|| RemoteError::NotFound(format!("State Machine Does Not Exist: {arn}")))
    }

    fn publish(&mut self, arn: &str, description: Option<&str>) -> Result<PublishedVersion> {
        let now = self.tick();
        let machine = self.machine_mut(arn)?;
        let number = machine.next_version;
        machine.next_version += 1;

        let mut snapshot = machine.config.clone();
        snapshot.description = description.map(ToString::to_string);
        snapshot.revision_id = Some(format!("rev-{number}"));
        snapshot.creation_date = Some(now);
        machine.versions.insert(number, snapshot);

        Ok(PublishedVersion {
            state_machine_arn: arn::unqualify(arn).to_string(),
            version_arn: arn::qualify(arn, &Qualifier::Version(number)),
            timestamp: now,
        })
    }

    fn rule_by_arn(&mut self, arn: &str) -> Result<&mut Rule> {
        self.rules
            .values_mut()
            .find(|r| r.arn.as_deref() == Some(arn))
            .ok_or_else(|| RemoteError::NotFound(format!("Rule {arn} does not exist")))
    }

    fn schedule_by_arn(&mut self, arn: &str) -> Result<&mut Schedule> {
        self.schedules
            .values_mut()
            .find(|s| s.arn.as_deref() == Some(arn))
            .ok_or_else(|| RemoteError::NotFound(format!("Schedule {arn} does not exist")))
    }
}

fn schedule_key(group_name: Option<&str>, name: &str) -> String {
    format!("{}/{name}", group_name.unwrap_or(DEFAULT_SCHEDULE_GROUP))
}

fn page_of<T: Clone>(items: &[T], token: Option<&str>) -> Result<Page<T>> {
    let start = match token {
        None => 0,
        Some(t) => t
            .parse::<usize>()
            .map_err(|_| RemoteError::InvalidRequest(format!("bad token {t}")))?,
    };
    let end = (start + PAGE_SIZE).min(items.len());
    let slice = items.get(start..end).unwrap_or_default().to_vec();
    let next_token = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: slice,
        next_token,
    })
}

impl FakeCloud {
    /// Create an empty fake cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Create a state machine with versions `1..=versions` already published.
    ///
    /// Returns its unqualified ARN.
    pub fn seed_state_machine(&self, mut config: StateMachine, versions: u64) -> String {
        let arn = state_machine_arn(&config.name);
        let mut state = self.state.lock();
        let now = state.tick();
        config.arn = Some(arn.clone());
        config.status = Some(StateMachineStatus::Active);
        config.creation_date = Some(now);
        state.machines.insert(
            arn.clone(),
            FakeMachine {
                config,
                versions: BTreeMap::new(),
                next_version: 1,
                aliases: BTreeMap::new(),
            },
        );
        for _ in 0..versions {
            let _ = state.publish(&arn, None);
        }
        arn
    }

    /// Point an alias (creating it if needed) at a single version.
    pub fn seed_alias(&self, state_machine_arn: &str, name: &str, version: u64) {
        self.seed_alias_routing(
            state_machine_arn,
            name,
            vec![RoutingEntry::full(arn::qualify(
                state_machine_arn,
                &Qualifier::Version(version),
            ))],
        );
    }

    /// Set an alias routing table verbatim.
    ///
    /// # Panics
    ///
    /// Panics if the state machine has not been seeded.
    pub fn seed_alias_routing(&self, state_machine_arn: &str, name: &str, routing: Vec<RoutingEntry>) {
        let mut state = self.state.lock();
        let now = state.tick();
        let machine = state
            .machine_mut(state_machine_arn)
            .expect("state machine must be seeded first");
        machine.aliases.insert(
            name.to_string(),
            Alias {
                name: name.to_string(),
                arn: arn::qualify(state_machine_arn, &Qualifier::alias(name)),
                description: None,
                routing,
                creation_date: Some(now),
                update_date: Some(now),
            },
        );
    }

    /// Store a rule as-is, including targets and tags.
    pub fn seed_rule(&self, mut rule: Rule) {
        rule.arn = Some(rule_arn(&rule.name));
        self.state.lock().rules.insert(rule.name.clone(), rule);
    }

    /// Store a schedule as-is, including tags.
    pub fn seed_schedule(&self, mut schedule: Schedule) {
        schedule.arn = Some(schedule_arn(schedule.group_name.as_deref(), &schedule.name));
        let key = schedule_key(schedule.group_name.as_deref(), &schedule.name);
        self.state.lock().schedules.insert(key, schedule);
    }

    // =========================================================================
    // Failure scripting
    // =========================================================================

    /// Report `status` from the next describe call instead of the real one.
    pub fn push_status(&self, status: StateMachineStatus) {
        self.state.lock().pending_statuses.push_back(status);
    }

    /// Fail the next describe call with `error`.
    pub fn fail_next_describe(&self, error: RemoteError) {
        self.state.lock().describe_failures.push_back(error);
    }

    /// Fail the next version delete with a conflict naming `aliases`.
    pub fn script_delete_conflict(&self, aliases: &[&str]) {
        self.state
            .lock()
            .delete_conflicts
            .push_back(aliases.iter().map(ToString::to_string).collect());
    }

    /// Reject any target with this id in `put_targets`.
    pub fn reject_target(&self, id: &str) {
        self.state.lock().rejected_targets.insert(id.to_string());
    }

    /// Make new executions finish with `status` after `polls` running describes.
    pub fn script_execution(&self, status: ExecutionStatus, polls: u32) {
        self.state.lock().execution_script = Some((status, polls));
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Mutating calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Published version numbers of a state machine, ascending.
    #[must_use]
    pub fn version_numbers(&self, state_machine_arn: &str) -> Vec<u64> {
        self.state
            .lock()
            .machine(state_machine_arn)
            .map(|m| m.versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Routing table of an alias, if it exists.
    #[must_use]
    pub fn alias_routing(&self, state_machine_arn: &str, name: &str) -> Option<Vec<RoutingEntry>> {
        self.state
            .lock()
            .machine(state_machine_arn)
            .ok()
            .and_then(|m| m.aliases.get(name).map(|a| a.routing.clone()))
    }

    /// Current configuration of a state machine, including tags.
    #[must_use]
    pub fn state_machine(&self, state_machine_arn: &str) -> Option<StateMachine> {
        self.state
            .lock()
            .machine(state_machine_arn)
            .ok()
            .map(|m| m.config.clone())
    }

    /// A rule, including targets and tags.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<Rule> {
        self.state.lock().rules.get(name).cloned()
    }

    /// A schedule, including tags.
    #[must_use]
    pub fn schedule(&self, group_name: Option<&str>, name: &str) -> Option<Schedule> {
        self.state
            .lock()
            .schedules
            .get(&schedule_key(group_name, name))
            .cloned()
    }

    /// Execution ARNs that were stopped.
    #[must_use]
    pub fn stopped_executions(&self) -> Vec<String> {
        self.state
            .lock()
            .executions
            .values()
            .filter(|e| e.execution.status == ExecutionStatus::Aborted)
            .map(|e| e.execution.execution_arn.clone())
            .collect()
    }
}

#[async_trait]
impl StateMachineCatalog for FakeCloud {
    async fn list_state_machines(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<StateMachineListItem>> {
        let state = self.state.lock();
        let items: Vec<_> = state
            .machines
            .values()
            .map(|m| StateMachineListItem {
                name: m.config.name.clone(),
                arn: m.config.arn.clone().unwrap_or_default(),
                creation_date: m.config.creation_date,
            })
            .collect();
        page_of(&items, next_token.as_deref())
    }

    async fn describe_state_machine(&self, arn: &str) -> Result<StateMachine> {
        let mut state = self.state.lock();
        if let Some(err) = state.describe_failures.pop_front() {
            return Err(err);
        }
        let pending = state.pending_statuses.pop_front();
        let machine = state.machine(arn)?;

        let mut described = match arn::qualifier_of(arn).map(str::parse::<Qualifier>) {
            None => machine.config.clone(),
            Some(Ok(Qualifier::Version(n))) => machine
                .versions
                .get(&n)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(format!("version {arn}")))?,
            Some(Ok(Qualifier::Alias(name))) => {
                let alias = machine
                    .aliases
                    .get(&name)
                    .ok_or_else(|| RemoteError::NotFound(format!("alias {arn}")))?;
                let version = alias
                    .routing
                    .first()
                    .and_then(|r| arn::parse_version_number(&r.version_arn).ok())
                    .and_then(|n| machine.versions.get(&n))
                    .ok_or_else(|| RemoteError::NotFound(format!("alias target {arn}")))?;
                version.clone()
            }
            Some(Err(e)) => return Err(RemoteError::InvalidRequest(e.to_string())),
        };
        described.arn = machine.config.arn.clone();
        described.tags = Tags::new();
        if let Some(status) = pending {
            described.status = Some(status);
        }
        Ok(described)
    }

    async fn create_state_machine(
        &self,
        state_machine: &StateMachine,
        version_description: Option<&str>,
    ) -> Result<PublishedVersion> {
        let arn = state_machine_arn(&state_machine.name);
        let mut state = self.state.lock();
        if state.machines.contains_key(&arn) {
            return Err(RemoteError::from_code(
                "StateMachineAlreadyExists",
                format!("State Machine Already Exists: {arn}"),
                400,
            ));
        }
        state.record(format!("create_state_machine {}", state_machine.name));
        let now = state.tick();

        let mut config = state_machine.clone();
        config.arn = Some(arn.clone());
        config.status = Some(StateMachineStatus::Active);
        config.creation_date = Some(now);
        state.machines.insert(
            arn.clone(),
            FakeMachine {
                config,
                versions: BTreeMap::new(),
                next_version: 1,
                aliases: BTreeMap::new(),
            },
        );
        state.publish(&arn, version_description)
    }

    async fn update_state_machine(
        &self,
        arn: &str,
        state_machine: &StateMachine,
        version_description: Option<&str>,
    ) -> Result<PublishedVersion> {
        let mut state = self.state.lock();
        state.record(format!("update_state_machine {}", arn::resource_name(arn)));
        let machine = state.machine_mut(arn)?;
        machine.config.definition.clone_from(&state_machine.definition);
        machine.config.role_arn.clone_from(&state_machine.role_arn);
        machine.config.logging = state_machine.logging.clone();
        machine.config.tracing = state_machine.tracing;
        state.publish(arn, version_description)
    }

    async fn delete_state_machine(&self, arn: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!("delete_state_machine {}", arn::resource_name(arn)));
        state
            .machines
            .remove(arn::unqualify(arn))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("State Machine Does Not Exist: {arn}")))
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!("tag_state_machine {}", arn::resource_name(arn)));
        state.machine_mut(arn)?.config.tags.merge(tags);
        Ok(())
    }

    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags> {
        Ok(self.state.lock().machine(arn)?.config.tags.clone())
    }
}

#[async_trait]
impl VersionRegistry for FakeCloud {
    async fn list_versions(
        &self,
        state_machine_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<VersionListItem>> {
        let state = self.state.lock();
        let machine = state.machine(state_machine_arn)?;
        // newest first, as the service lists them
        let items: Vec<_> = machine
            .versions
            .iter()
            .rev()
            .map(|(n, v)| VersionListItem {
                arn: arn::qualify(state_machine_arn, &Qualifier::Version(*n)),
                creation_date: v.creation_date,
            })
            .collect();
        page_of(&items, next_token.as_deref())
    }

    async fn delete_version(&self, version_arn: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!("delete_version {version_arn}"));

        if let Some(aliases) = state.delete_conflicts.pop_front() {
            return Err(conflict(&aliases));
        }

        let number = arn::parse_version_number(version_arn)
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
        let machine = state.machine_mut(version_arn)?;
        let referencing: Vec<String> = machine
            .aliases
            .values()
            .filter(|a| a.routing.iter().any(|r| r.version_arn == version_arn))
            .map(|a| a.name.clone())
            .collect();
        if !referencing.is_empty() {
            return Err(conflict(&referencing));
        }
        machine
            .versions
            .remove(&number)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("version {version_arn}")))
    }

    async fn list_aliases(
        &self,
        state_machine_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<AliasListItem>> {
        let state = self.state.lock();
        let items: Vec<_> = state
            .machine(state_machine_arn)?
            .aliases
            .values()
            .map(|a| AliasListItem {
                arn: a.arn.clone(),
                creation_date: a.creation_date,
            })
            .collect();
        page_of(&items, next_token.as_deref())
    }

    async fn describe_alias(&self, alias_arn: &str) -> Result<Alias> {
        let state = self.state.lock();
        let name = arn::qualifier_of(alias_arn).unwrap_or_default();
        state
            .machine(alias_arn)?
            .aliases
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("alias {alias_arn}")))
    }

    async fn create_alias(
        &self,
        name: &str,
        description: Option<&str>,
        routing: &[RoutingEntry],
    ) -> Result<String> {
        validate_routing(routing)?;
        let mut state = self.state.lock();
        state.record(format!("create_alias {name}"));
        let now = state.tick();
        let target = &routing[0].version_arn;
        let alias_arn = arn::qualify(target, &Qualifier::alias(name));
        let machine = state.machine_mut(target)?;
        if machine.aliases.contains_key(name) {
            return Err(RemoteError::Conflict(format!("alias {name} already exists")));
        }
        machine.aliases.insert(
            name.to_string(),
            Alias {
                name: name.to_string(),
                arn: alias_arn.clone(),
                description: description.map(ToString::to_string),
                routing: routing.to_vec(),
                creation_date: Some(now),
                update_date: Some(now),
            },
        );
        Ok(alias_arn)
    }

    async fn update_alias(
        &self,
        alias_arn: &str,
        description: Option<&str>,
        routing: &[RoutingEntry],
    ) -> Result<()> {
        validate_routing(routing)?;
        let mut state = self.state.lock();
        state.record(format!("update_alias {alias_arn} -> {}", routing[0].version_arn));
        let now = state.tick();
        let name = arn::qualifier_of(alias_arn).unwrap_or_default().to_string();
        let alias = state
            .machine_mut(alias_arn)?
            .aliases
            .get_mut(&name)
            .ok_or_else(|| RemoteError::NotFound(format!("alias {alias_arn}")))?;
        alias.routing = routing.to_vec();
        if let Some(d) = description {
            alias.description = Some(d.to_string());
        }
        alias.update_date = Some(now);
        Ok(())
    }
}

fn conflict(aliases: &[String]) -> RemoteError {
    RemoteError::Conflict(format!(
        "Version to be deleted must not be referenced by an alias. \
         Current list of aliases referencing this version: [{}]",
        aliases.join(", ")
    ))
}

fn validate_routing(routing: &[RoutingEntry]) -> Result<()> {
    let total: u32 = routing.iter().map(|r| u32::from(r.weight)).sum();
    if routing.is_empty() || total != 100 {
        return Err(RemoteError::from_code(
            "ValidationException",
            format!("routing weights must sum to 100, got {total}"),
            400,
        ));
    }
    Ok(())
}

#[async_trait]
impl ExecutionControl for FakeCloud {
    async fn start_execution(
        &self,
        state_machine_arn: &str,
        name: &str,
        _input: &str,
    ) -> Result<StartedExecution> {
        let mut state = self.state.lock();
        state.machine(state_machine_arn)?;
        state.record(format!("start_execution {name}"));
        let now = state.tick();
        let execution_arn = format!(
            "arn:aws:states:{ACCOUNT}:execution:{}:{name}",
            arn::resource_name(state_machine_arn)
        );
        let (final_status, polls) = state
            .execution_script
            .unwrap_or((ExecutionStatus::Succeeded, 0));
        state.executions.insert(
            execution_arn.clone(),
            FakeExecution {
                execution: Execution {
                    execution_arn: execution_arn.clone(),
                    name: name.to_string(),
                    status: ExecutionStatus::Running,
                    start_date: Some(now),
                    stop_date: None,
                    output: None,
                    error: None,
                    cause: None,
                },
                final_status,
                polls_remaining: polls,
            },
        );
        Ok(StartedExecution {
            execution_arn,
            start_date: now,
        })
    }

    async fn stop_execution(&self, execution_arn: &str, error: &str, cause: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!("stop_execution {execution_arn}"));
        let now = state.tick();
        let exec = state
            .executions
            .get_mut(execution_arn)
            .ok_or_else(|| RemoteError::NotFound(format!("execution {execution_arn}")))?;
        exec.execution.status = ExecutionStatus::Aborted;
        exec.execution.error = Some(error.to_string());
        exec.execution.cause = Some(cause.to_string());
        exec.execution.stop_date = Some(now);
        exec.final_status = ExecutionStatus::Aborted;
        exec.polls_remaining = 0;
        Ok(())
    }

    async fn describe_execution(&self, execution_arn: &str) -> Result<Execution> {
        let mut state = self.state.lock();
        let now = state.tick();
        let exec = state
            .executions
            .get_mut(execution_arn)
            .ok_or_else(|| RemoteError::NotFound(format!("execution {execution_arn}")))?;
        if exec.polls_remaining > 0 {
            exec.polls_remaining -= 1;
        } else if !exec.execution.status.is_terminal() {
            exec.execution.status = exec.final_status;
            exec.execution.stop_date = Some(now);
            match exec.final_status {
                ExecutionStatus::Succeeded => exec.execution.output = Some("{}".to_string()),
                status if status.is_failure() => {
                    exec.execution.error = Some("States.TaskFailed".to_string());
                    exec.execution.cause = Some("scripted failure".to_string());
                }
                _ => {}
            }
        }
        Ok(exec.execution.clone())
    }

    async fn get_execution_history(
        &self,
        execution_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<HistoryEvent>> {
        let state = self.state.lock();
        let exec = state
            .executions
            .get(execution_arn)
            .ok_or_else(|| RemoteError::NotFound(format!("execution {execution_arn}")))?;
        let last = match exec.execution.status {
            ExecutionStatus::Succeeded => "ExecutionSucceeded",
            ExecutionStatus::Aborted => "ExecutionAborted",
            ExecutionStatus::Failed => "ExecutionFailed",
            ExecutionStatus::TimedOut => "ExecutionTimedOut",
            ExecutionStatus::Running | ExecutionStatus::PendingRedrive => "PassStateEntered",
        };
        let events: Vec<_> = ["ExecutionStarted", "PassStateEntered", last]
            .iter()
            .enumerate()
            .map(|(i, t)| HistoryEvent {
                id: i as u64 + 1,
                event_type: (*t).to_string(),
                timestamp: exec.execution.start_date,
            })
            .collect();
        page_of(&events, next_token.as_deref())
    }
}

#[async_trait]
impl RuleApi for FakeCloud {
    async fn list_rule_names_by_target(
        &self,
        target_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>> {
        let state = self.state.lock();
        let names: Vec<_> = state
            .rules
            .values()
            .filter(|r| r.targets.iter().any(|t| t.arn == target_arn))
            .map(|r| r.name.clone())
            .collect();
        page_of(&names, next_token.as_deref())
    }

    async fn describe_rule(&self, name: &str) -> Result<Rule> {
        let state = self.state.lock();
        let mut rule = state
            .rules
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("Rule {name} does not exist")))?;
        rule.targets.clear();
        rule.tags = Tags::new();
        rule
            .event_bus_name
            .get_or_insert_with(|| DEFAULT_EVENT_BUS.to_string());
        Ok(rule)
    }

    async fn put_rule(&self, rule: &Rule) -> Result<String> {
        let mut state = self.state.lock();
        state.record(format!("put_rule {}", rule.name));
        let arn = rule_arn(&rule.name);
        let entry = state.rules.entry(rule.name.clone()).or_default();
        let targets = std::mem::take(&mut entry.targets);
        let tags = std::mem::take(&mut entry.tags);
        *entry = Rule {
            arn: Some(arn.clone()),
            targets,
            tags,
            ..rule.clone()
        };
        Ok(arn)
    }

    async fn delete_rule(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!("delete_rule {name}"));
        let rule = state
            .rules
            .get(name)
            .ok_or_else(|| RemoteError::NotFound(format!("Rule {name} does not exist")))?;
        if !rule.targets.is_empty() {
            return Err(RemoteError::from_code(
                "ValidationException",
                "Rule can't be deleted since it has targets.",
                400,
            ));
        }
        state.rules.remove(name);
        Ok(())
    }

    async fn list_targets_by_rule(
        &self,
        name: &str,
        next_token: Option<String>,
    ) -> Result<Page<RuleTarget>> {
        let state = self.state.lock();
        let rule = state
            .rules
            .get(name)
            .ok_or_else(|| RemoteError::NotFound(format!("Rule {name} does not exist")))?;
        page_of(&rule.targets, next_token.as_deref())
    }

    async fn put_targets(&self, name: &str, targets: &[RuleTarget]) -> Result<TargetWriteOutcome> {
        let mut state = self.state.lock();
        state.record(format!("put_targets {name}"));
        let rejected = state.rejected_targets.clone();
        let rule = state
            .rules
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("Rule {name} does not exist")))?;
        let mut outcome = TargetWriteOutcome::default();
        for target in targets {
            if rejected.contains(&target.id) {
                outcome.failed_entry_count += 1;
                outcome
                    .failed_entries
                    .push(format!("{}: ValidationException rejected", target.id));
                continue;
            }
            match rule.targets.iter_mut().find(|t| t.id == target.id) {
                Some(existing) => *existing = target.clone(),
                None => rule.targets.push(target.clone()),
            }
        }
        Ok(outcome)
    }

    async fn remove_targets(&self, name: &str, ids: &[String]) -> Result<TargetWriteOutcome> {
        let mut state = self.state.lock();
        state.record(format!("remove_targets {name}"));
        let rule = state
            .rules
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("Rule {name} does not exist")))?;
        rule.targets.retain(|t| !ids.contains(&t.id));
        Ok(TargetWriteOutcome::default())
    }

    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags> {
        Ok(self.state.lock().rule_by_arn(arn)?.tags.clone())
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!("tag_rule {}", arn.rsplit('/').next().unwrap_or(arn)));
        state.rule_by_arn(arn)?.tags.merge(tags);
        Ok(())
    }
}

#[async_trait]
impl ScheduleApi for FakeCloud {
    async fn list_schedules(&self, next_token: Option<String>) -> Result<Page<ScheduleSummary>> {
        let state = self.state.lock();
        let items: Vec<_> = state
            .schedules
            .values()
            .map(|s| ScheduleSummary {
                name: s.name.clone(),
                group_name: Some(
                    s.group_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SCHEDULE_GROUP.to_string()),
                ),
                arn: s.arn.clone().unwrap_or_default(),
                target_arn: s.target.arn.clone(),
                state: s.state,
            })
            .collect();
        page_of(&items, next_token.as_deref())
    }

    async fn get_schedule(&self, group_name: Option<&str>, name: &str) -> Result<Schedule> {
        let state = self.state.lock();
        let mut schedule = state
            .schedules
            .get(&schedule_key(group_name, name))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("Schedule {name} does not exist.")))?;
        schedule.tags = Tags::new();
        schedule
            .group_name
            .get_or_insert_with(|| DEFAULT_SCHEDULE_GROUP.to_string());
        Ok(schedule)
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String> {
        let mut state = self.state.lock();
        state.record(format!("create_schedule {}", schedule.name));
        let key = schedule_key(schedule.group_name.as_deref(), &schedule.name);
        if state.schedules.contains_key(&key) {
            return Err(RemoteError::Conflict(format!(
                "Schedule {} already exists.",
                schedule.name
            )));
        }
        let arn = schedule_arn(schedule.group_name.as_deref(), &schedule.name);
        let mut stored = schedule.clone();
        stored.arn = Some(arn.clone());
        stored.tags = Tags::new();
        state.schedules.insert(key, stored);
        Ok(arn)
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<String> {
        let mut state = self.state.lock();
        state.record(format!("update_schedule {}", schedule.name));
        let key = schedule_key(schedule.group_name.as_deref(), &schedule.name);
        let existing = state.schedules.get_mut(&key).ok_or_else(|| {
            RemoteError::NotFound(format!("Schedule {} does not exist.", schedule.name))
        })?;
        let tags = std::mem::take(&mut existing.tags);
        let arn = existing.arn.clone();
        *existing = Schedule {
            arn: arn.clone(),
            tags,
            ..schedule.clone()
        };
        Ok(arn.unwrap_or_default())
    }

    async fn delete_schedule(&self, group_name: Option<&str>, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!("delete_schedule {name}"));
        state
            .schedules
            .remove(&schedule_key(group_name, name))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("Schedule {name} does not exist.")))
    }

    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags> {
        Ok(self.state.lock().schedule_by_arn(arn)?.tags.clone())
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()> {
        let mut state = self.state.lock();
        state.record(format!(
            "tag_schedule {}",
            arn.rsplit('/').next().unwrap_or(arn)
        ));
        state.schedule_by_arn(arn)?.tags.merge(tags);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paginate::collect_all;

    fn machine(name: &str) -> StateMachine {
        StateMachine {
            name: name.to_string(),
            definition: "{}".to_string(),
            role_arn: "arn:aws:iam::123456789012:role/sfn".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn versions_increase_and_list_newest_first() {
        let cloud = FakeCloud::new();
        let arn = cloud.seed_state_machine(machine("orders"), 3);

        let published = cloud
            .update_state_machine(&arn, &machine("orders"), Some("fourth"))
            .await
            .unwrap();
        assert_eq!(published.version_arn, format!("{arn}:4"));

        let versions = collect_all(|t| cloud.list_versions(&arn, t)).await.unwrap();
        let arns: Vec<_> = versions.iter().map(|v| v.arn.clone()).collect();
        assert_eq!(
            arns,
            vec![
                format!("{arn}:4"),
                format!("{arn}:3"),
                format!("{arn}:2"),
                format!("{arn}:1")
            ]
        );
    }

    #[tokio::test]
    async fn aliased_version_cannot_be_deleted() {
        let cloud = FakeCloud::new();
        let arn = cloud.seed_state_machine(machine("orders"), 2);
        cloud.seed_alias(&arn, "current", 2);

        let err = cloud.delete_version(&format!("{arn}:2")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(ref m) if m.ends_with("[current]")));

        cloud.delete_version(&format!("{arn}:1")).await.unwrap();
        assert_eq!(cloud.version_numbers(&arn), vec![2]);
    }

    #[tokio::test]
    async fn describe_through_alias() {
        let cloud = FakeCloud::new();
        let arn = cloud.seed_state_machine(machine("orders"), 2);
        cloud.seed_alias(&arn, "current", 1);

        let sm = cloud
            .describe_state_machine(&format!("{arn}:current"))
            .await
            .unwrap();
        assert_eq!(sm.revision_id.as_deref(), Some("rev-1"));
    }

    #[tokio::test]
    async fn rule_cannot_be_deleted_with_targets() {
        let cloud = FakeCloud::new();
        cloud.seed_rule(Rule {
            name: "nightly".into(),
            targets: vec![RuleTarget {
                id: "t".into(),
                arn: "arn:x".into(),
                role_arn: None,
                input: None,
            }],
            ..Default::default()
        });

        assert!(cloud.delete_rule("nightly").await.is_err());
        cloud
            .remove_targets("nightly", &["t".to_string()])
            .await
            .unwrap();
        cloud.delete_rule("nightly").await.unwrap();
        assert!(cloud.rule("nightly").is_none());
    }

    #[tokio::test]
    async fn reads_report_default_bus_and_group() {
        let cloud = FakeCloud::new();
        cloud.seed_rule(Rule {
            name: "nightly".into(),
            ..Default::default()
        });
        cloud.seed_schedule(Schedule {
            name: "nightly".into(),
            ..Default::default()
        });

        let rule = cloud.describe_rule("nightly").await.unwrap();
        assert_eq!(rule.event_bus_name.as_deref(), Some(DEFAULT_EVENT_BUS));

        let schedule = cloud.get_schedule(None, "nightly").await.unwrap();
        assert_eq!(schedule.group_name.as_deref(), Some(DEFAULT_SCHEDULE_GROUP));
        let listed = cloud.list_schedules(None).await.unwrap();
        assert_eq!(listed.items[0].group_name.as_deref(), Some(DEFAULT_SCHEDULE_GROUP));
    }

    #[tokio::test]
    async fn routing_must_sum_to_hundred() {
        let cloud = FakeCloud::new();
        let arn = cloud.seed_state_machine(machine("orders"), 1);
        let err = cloud
            .create_alias(
                "current",
                None,
                &[RoutingEntry {
                    version_arn: format!("{arn}:1"),
                    weight: 50,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Api { .. }));
    }
}
