//! Capability interfaces over the remote control planes.
//!
//! Each trait covers one operation group so that fakes in tests only need to
//! implement what the code under test calls. The traits carry no logic; they
//! mirror the remote call shapes one-to-one.

use async_trait::async_trait;
use stepctl_core::Tags;

use crate::error::Result;
use crate::events::{Rule, RuleTarget, Schedule, ScheduleSummary, TargetWriteOutcome};
use crate::paginate::Page;
use crate::types::{
    Alias, AliasListItem, Execution, HistoryEvent, PublishedVersion, RoutingEntry, StartedExecution,
    StateMachine, StateMachineListItem, VersionListItem,
};

/// Listing, describing, writing and tagging state machines.
#[async_trait]
pub trait StateMachineCatalog: Send + Sync {
    /// List one page of state machines.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_state_machines(
        &self,
        next_token: Option<String>,
    ) -> Result<Page<StateMachineListItem>>;

    /// Describe a state machine by unqualified, alias- or version-qualified ARN.
    ///
    /// Tags are not included; see [`StateMachineCatalog::list_tags_for_resource`].
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the resource does not exist.
    async fn describe_state_machine(&self, arn: &str) -> Result<StateMachine>;

    /// Create a state machine and publish its first version.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn create_state_machine(
        &self,
        state_machine: &StateMachine,
        version_description: Option<&str>,
    ) -> Result<PublishedVersion>;

    /// Update a state machine's configuration and publish a new version.
    ///
    /// Tags are not part of this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn update_state_machine(
        &self,
        arn: &str,
        state_machine: &StateMachine,
        version_description: Option<&str>,
    ) -> Result<PublishedVersion>;

    /// Delete a state machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn delete_state_machine(&self, arn: &str) -> Result<()>;

    /// Add or overwrite tags on a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()>;

    /// Read the tags of a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags>;
}

/// Versions and aliases of a state machine.
#[async_trait]
pub trait VersionRegistry: Send + Sync {
    /// List one page of published versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_versions(
        &self,
        state_machine_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<VersionListItem>>;

    /// Delete a published version.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Conflict` if an alias still references the version.
    async fn delete_version(&self, version_arn: &str) -> Result<()>;

    /// List one page of aliases.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_aliases(
        &self,
        state_machine_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<AliasListItem>>;

    /// Describe an alias by its alias-qualified ARN.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the alias does not exist.
    async fn describe_alias(&self, alias_arn: &str) -> Result<Alias>;

    /// Create an alias, returning its ARN.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn create_alias(
        &self,
        name: &str,
        description: Option<&str>,
        routing: &[RoutingEntry],
    ) -> Result<String>;

    /// Replace an alias's routing table.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn update_alias(
        &self,
        alias_arn: &str,
        description: Option<&str>,
        routing: &[RoutingEntry],
    ) -> Result<()>;
}

/// Running executions of a state machine.
#[async_trait]
pub trait ExecutionControl: Send + Sync {
    /// Start an execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn start_execution(
        &self,
        state_machine_arn: &str,
        name: &str,
        input: &str,
    ) -> Result<StartedExecution>;

    /// Stop a running execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn stop_execution(&self, execution_arn: &str, error: &str, cause: &str) -> Result<()>;

    /// Describe an execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn describe_execution(&self, execution_arn: &str) -> Result<Execution>;

    /// Read one page of execution history.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn get_execution_history(
        &self,
        execution_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<HistoryEvent>>;
}

/// Event rules and their targets.
#[async_trait]
pub trait RuleApi: Send + Sync {
    /// List one page of rule names targeting `target_arn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_rule_names_by_target(
        &self,
        target_arn: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>>;

    /// Describe a rule. Targets and tags are not included.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the rule does not exist.
    async fn describe_rule(&self, name: &str) -> Result<Rule>;

    /// Create or update a rule, returning its ARN. Targets and tags are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn put_rule(&self, rule: &Rule) -> Result<String>;

    /// Delete a rule. All targets must be removed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn delete_rule(&self, name: &str) -> Result<()>;

    /// List one page of targets of a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_targets_by_rule(
        &self,
        name: &str,
        next_token: Option<String>,
    ) -> Result<Page<RuleTarget>>;

    /// Add or replace targets of a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the call itself fails; per-entry rejections are
    /// reported in the outcome.
    async fn put_targets(&self, name: &str, targets: &[RuleTarget]) -> Result<TargetWriteOutcome>;

    /// Remove targets of a rule by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the call itself fails; per-entry rejections are
    /// reported in the outcome.
    async fn remove_targets(&self, name: &str, ids: &[String]) -> Result<TargetWriteOutcome>;

    /// Read the tags of a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags>;

    /// Add or overwrite tags of a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()>;
}

/// Time-based schedules.
#[async_trait]
pub trait ScheduleApi: Send + Sync {
    /// List one page of schedules.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_schedules(&self, next_token: Option<String>) -> Result<Page<ScheduleSummary>>;

    /// Fetch a schedule. Tags are not included.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the schedule does not exist.
    async fn get_schedule(&self, group_name: Option<&str>, name: &str) -> Result<Schedule>;

    /// Create a schedule, returning its ARN.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn create_schedule(&self, schedule: &Schedule) -> Result<String>;

    /// Replace a schedule, returning its ARN.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the schedule does not exist.
    async fn update_schedule(&self, schedule: &Schedule) -> Result<String>;

    /// Delete a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn delete_schedule(&self, group_name: Option<&str>, name: &str) -> Result<()>;

    /// Read the tags of a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn list_tags_for_resource(&self, arn: &str) -> Result<Tags>;

    /// Add or overwrite tags of a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<()>;
}
