//! Deploy, rollback, diff, versions, status, delete and execute workflows.
//!
//! [`App`] ties one [`DeployConfig`] to the lifecycle manager, the two
//! trigger reconcilers and the execution runner. Each workflow is a linear
//! sequence of remote calls; dry runs only read.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use stepctl_core::{arn, Qualifier, Tags, CURRENT_ALIAS};
use stepctl_remote::{
    Alias, ExecutionControl, Rule, RuleApi, Schedule, ScheduleApi, StateMachine,
    StateMachineCatalog, VersionRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::DeployConfig;
use crate::diff::{render_json, DiffFormat, DiffOptions};
use crate::error::{DeployError, Result};
use crate::execution::{ExecutionConfig, ExecutionOutcome, ExecutionRequest, ExecutionRunner};
use crate::manager::{
    DeployOutput, LifecycleManager, ManagerConfig, PurgeReport, RollbackOutcome, VersionInfo,
};
use crate::reconcile::{ApplyReport, Reconciler, RuleBackend, ScheduleBackend, TriggerResource};

/// Binding target shown in dry runs before the state machine exists.
const UNKNOWN_TARGET: &str = "(known after deploy)";

/// Settings for [`App`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AppOptions {
    /// Lifecycle manager settings.
    pub manager: ManagerConfig,
    /// Execution polling settings.
    pub execution: ExecutionConfig,
    /// Emit colored diffs.
    pub color: bool,
}

/// Options of [`App::deploy`].
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Only render what would change.
    pub dry_run: bool,
    /// Leave triggers alone.
    pub skip_trigger: bool,
    /// Description recorded on the published version.
    pub version_description: Option<String>,
}

/// The workflows over one configured state machine.
pub struct App<S, E, C>
where
    S: StateMachineCatalog + VersionRegistry + ExecutionControl,
    E: RuleApi,
    C: ScheduleApi,
{
    config: DeployConfig,
    manager: LifecycleManager<S>,
    rules: Reconciler<RuleBackend<E>>,
    schedules: Reconciler<ScheduleBackend<C>>,
    executions: ExecutionRunner<S>,
    color: bool,
}

impl<S, E, C> App<S, E, C>
where
    S: StateMachineCatalog + VersionRegistry + ExecutionControl,
    E: RuleApi,
    C: ScheduleApi,
{
    /// Create the workflows for `config` over the three remotes.
    #[must_use]
    pub fn new(
        config: DeployConfig,
        states: Arc<S>,
        events: Arc<E>,
        scheduler: Arc<C>,
        options: AppOptions,
    ) -> Self {
        Self {
            config,
            manager: LifecycleManager::new(Arc::clone(&states), options.manager),
            rules: Reconciler::new(RuleBackend::new(events)),
            schedules: Reconciler::new(ScheduleBackend::new(scheduler)),
            executions: ExecutionRunner::new(states, options.execution),
            color: options.color,
        }
    }

    /// The loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// The lifecycle manager.
    #[must_use]
    pub const fn manager(&self) -> &LifecycleManager<S> {
        &self.manager
    }

    fn name(&self) -> &str {
        &self.config.state_machine.name
    }

    fn diff_options(&self, format: DiffFormat) -> DiffOptions {
        DiffOptions {
            format,
            color: self.color,
        }
    }

    async fn find(&self) -> Result<Option<String>> {
        match self.manager.get_arn(self.name()).await {
            Ok(arn) => Ok(Some(arn)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_described(&self, qualifier: Option<&Qualifier>) -> Result<Option<StateMachine>> {
        if self.find().await?.is_none() {
            return Ok(None);
        }
        match self.manager.describe(self.name(), qualifier).await {
            Ok(sm) => Ok(Some(sm)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Deploy
    // =========================================================================

    /// Deploy the state machine and reconcile its triggers.
    ///
    /// Triggers are bound to the `current` alias. When `keep_versions` is
    /// configured, old versions are purged afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::TargetWrite`] if any trigger target was
    /// rejected, or the first failing step's error.
    pub async fn deploy(&self, options: &DeployOptions) -> Result<DeployReport> {
        if options.dry_run {
            let diff = self.plan_diff(DiffFormat::Unified, None, !options.skip_trigger).await?;
            return Ok(DeployReport {
                dry_run: true,
                diff: Some(diff),
                ..DeployReport::default()
            });
        }

        let output = self
            .manager
            .deploy(&self.config.state_machine(), options.version_description.as_deref())
            .await?;
        let mut report = DeployReport {
            output: Some(output.clone()),
            ..DeployReport::default()
        };

        if options.skip_trigger {
            info!("Skipping triggers");
        } else {
            let target = arn::qualify(&output.state_machine_arn, &Qualifier::current());
            let plan = self.rules.plan(&target, &self.config.rules()).await?;
            report.rules = self.rules.apply(&target, &plan).await?;
            let plan = self.schedules.plan(&target, &self.config.schedules()).await?;
            report.schedules = self.schedules.apply(&target, &plan).await?;

            let failed = report.rules.failed_entry_count + report.schedules.failed_entry_count;
            if failed > 0 {
                return Err(DeployError::TargetWrite { count: failed });
            }
        }

        if let Some(keep) = self.config.keep_versions {
            report.purge = Some(
                self.manager
                    .purge_versions(&output.state_machine_arn, keep)
                    .await?,
            );
        }
        Ok(report)
    }

    /// Render the state machine diff and, optionally, both trigger plans.
    async fn plan_diff(
        &self,
        format: DiffFormat,
        qualifier: Option<&Qualifier>,
        with_triggers: bool,
    ) -> Result<String> {
        let options = self.diff_options(format);
        let live = self.find_described(qualifier).await?;
        let desired = desired_for(&self.config.state_machine(), live.as_ref());

        let label = format!("state_machine/{}", self.name());
        let (old_label, old) = match &live {
            Some(sm) => (
                qualifier.map_or_else(|| label.clone(), |q| format!("{label}:{q}")),
                state_machine_snapshot(sm),
            ),
            None => ("/dev/null".to_string(), Value::Null),
        };
        let mut out = render_json(&old_label, &label, &old, &state_machine_snapshot(&desired), options)
            .unwrap_or_default();

        if with_triggers {
            let target = match &live {
                Some(sm) => arn::qualify(
                    sm.arn.as_deref().map_or(UNKNOWN_TARGET, arn::unqualify),
                    &Qualifier::current(),
                ),
                None => arn::qualify(UNKNOWN_TARGET, &Qualifier::current()),
            };
            out.push_str(&self.rules.plan(&target, &self.config.rules()).await?.render(options));
            out.push_str(
                &self
                    .schedules
                    .plan(&target, &self.config.schedules())
                    .await?
                    .render(options),
            );
        }
        Ok(out)
    }

    // =========================================================================
    // Rollback / diff / versions
    // =========================================================================

    /// Move `current` back one version.
    ///
    /// # Errors
    ///
    /// See [`LifecycleManager::rollback`].
    pub async fn rollback(&self, dry_run: bool, keep_version: bool) -> Result<RollbackOutcome> {
        self.manager.rollback(self.name(), keep_version, dry_run).await
    }

    /// Diff the configuration against the live state machine and triggers.
    ///
    /// Without a qualifier the `current` alias is compared, falling back to
    /// the latest configuration when the alias does not exist. Returns an
    /// empty string when nothing differs.
    ///
    /// # Errors
    ///
    /// Returns an error if a read needed for the diff fails.
    pub async fn diff(&self, unified: bool, qualifier: Option<&Qualifier>) -> Result<String> {
        let format = if unified {
            DiffFormat::Unified
        } else {
            DiffFormat::Compact
        };
        let current = Qualifier::current();
        let qualifier = match qualifier {
            Some(q) => Some(q),
            None => match self.manager.describe_alias(self.name(), CURRENT_ALIAS).await {
                Ok(_) => Some(&current),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
        };
        self.plan_diff(format, qualifier, true).await
    }

    /// List versions, or purge old ones when `delete` is set.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Config`] if purging without a keep count, or
    /// the listing or purge error.
    pub async fn versions(&self, delete: bool, keep_versions: Option<usize>) -> Result<VersionsReport> {
        if !delete {
            return Ok(VersionsReport::Listed(self.manager.list_versions(self.name()).await?));
        }
        let keep = keep_versions.or(self.config.keep_versions).ok_or_else(|| {
            DeployError::Config("a keep count is required to delete versions".into())
        })?;
        Ok(VersionsReport::Purged(
            self.manager.purge_versions(self.name(), keep).await?,
        ))
    }

    // =========================================================================
    // Status / delete / execute
    // =========================================================================

    /// Summarize the state machine, its `current` alias and its triggers.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the state machine does not exist.
    pub async fn status(&self) -> Result<StatusReport> {
        let state_machine = self.manager.describe(self.name(), None).await?;
        let current = match self.manager.describe_alias(self.name(), CURRENT_ALIAS).await {
            Ok(alias) => Some(alias),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let target = arn::qualify(
            state_machine.arn.as_deref().unwrap_or_default(),
            &Qualifier::current(),
        );
        let rules = self.rules.search_related(&target, &self.config.rules()).await?;
        let schedules = self
            .schedules
            .search_related(&target, &self.config.schedules())
            .await?;

        let mut unowned = rules.unowned;
        unowned.extend(schedules.unowned);
        Ok(StatusReport {
            state_machine,
            current,
            rules: rules.current,
            schedules: schedules.current,
            unowned,
        })
    }

    /// Delete owned triggers, then the state machine.
    ///
    /// # Errors
    ///
    /// Returns the first failing delete.
    pub async fn delete(&self, dry_run: bool) -> Result<DeleteReport> {
        let Some(sm_arn) = self.find().await? else {
            info!(state_machine = %self.name(), "State machine does not exist");
            return Ok(DeleteReport {
                dry_run,
                ..DeleteReport::default()
            });
        };

        let target = arn::qualify(&sm_arn, &Qualifier::current());
        let rules = self.rules.search_related(&target, &self.config.rules()).await?;
        let schedules = self
            .schedules
            .search_related(&target, &self.config.schedules())
            .await?;

        let report = DeleteReport {
            state_machine: Some(sm_arn),
            triggers: rules
                .current
                .iter()
                .map(TriggerResource::label)
                .chain(schedules.current.iter().map(TriggerResource::label))
                .collect(),
            dry_run,
        };
        if dry_run {
            return Ok(report);
        }

        self.rules.delete(&rules.current).await?;
        self.schedules.delete(&schedules.current).await?;
        self.manager.delete(self.name()).await?;
        Ok(report)
    }

    /// Start an execution through the `current` alias.
    ///
    /// # Errors
    ///
    /// See [`ExecutionRunner::run`].
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let arn = self.manager.get_arn(self.name()).await?;
        self.executions.run(&arn, request, cancel).await
    }
}

/// The state machine a deploy would write over `live`: live tags merged
/// with the declared ones, plus the ownership tag.
fn desired_for(declared: &StateMachine, live: Option<&StateMachine>) -> StateMachine {
    let mut tags = live.map(|sm| sm.tags.clone()).unwrap_or_else(Tags::new);
    tags.merge(&declared.tags);
    StateMachine {
        tags: tags.with_ownership(),
        ..declared.clone()
    }
}

/// Diffable view of a state machine's configuration.
///
/// The definition is embedded as JSON when it parses, so that formatting
/// changes alone do not show up.
#[must_use]
pub fn state_machine_snapshot(sm: &StateMachine) -> Value {
    let definition = serde_json::from_str::<Value>(&sm.definition)
        .unwrap_or_else(|_| Value::String(sm.definition.clone()));
    json!({
        "name": sm.name,
        "type": sm.machine_type,
        "roleArn": sm.role_arn,
        "definition": definition,
        "loggingConfiguration": sm.logging,
        "tracingConfiguration": sm.tracing,
        "tags": sm.tags,
    })
}

// =============================================================================
// Reports
// =============================================================================

/// Result of [`App::deploy`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    /// True if nothing was written.
    pub dry_run: bool,
    /// Rendered plan of a dry run.
    pub diff: Option<String>,
    /// The published version.
    pub output: Option<DeployOutput>,
    /// Rule changes.
    pub rules: ApplyReport,
    /// Schedule changes.
    pub schedules: ApplyReport,
    /// Versions purged afterwards.
    pub purge: Option<PurgeReport>,
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(diff) = &self.diff {
            if diff.is_empty() {
                return writeln!(f, "No changes");
            }
            return write!(f, "{diff}");
        }
        if let Some(out) = &self.output {
            let verb = if out.created { "Created" } else { "Updated" };
            writeln!(f, "{verb} {}", out.state_machine_arn)?;
            writeln!(f, "Published {} at {}", out.version_arn, out.update_date.to_rfc3339())?;
        }
        for (name, action) in self.rules.outcomes.iter().chain(&self.schedules.outcomes) {
            writeln!(f, "{action:?} {name}")?;
        }
        if let Some(purge) = &self.purge {
            if !purge.deleted.is_empty() {
                writeln!(f, "Purged versions {:?}", purge.deleted)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleting => writeln!(f, "State machine is being deleted, nothing to do"),
            Self::MultipleRoutes(n) => writeln!(
                f,
                "Alias {CURRENT_ALIAS} routes to {n} versions, roll back manually"
            ),
            Self::NothingToRollBack => writeln!(f, "Nothing to roll back"),
            Self::RolledBack {
                from,
                to,
                deleted,
                dry_run,
            } => {
                let prefix = if *dry_run { "[dry-run] " } else { "" };
                writeln!(f, "{prefix}Rolled back {CURRENT_ALIAS} from version {from} to {to}")?;
                if *deleted {
                    writeln!(f, "Deleted version {from}")?;
                }
                Ok(())
            }
        }
    }
}

/// Result of [`App::versions`].
#[derive(Debug, Clone, Serialize)]
pub enum VersionsReport {
    /// Versions, newest first.
    Listed(Vec<VersionInfo>),
    /// Outcome of a purge.
    Purged(PurgeReport),
}

impl fmt::Display for VersionsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listed(versions) => {
                writeln!(f, "{:>7}  {:<25}  {:<20}  DESCRIPTION", "VERSION", "CREATED", "ALIASES")?;
                for v in versions {
                    writeln!(
                        f,
                        "{:>7}  {:<25}  {:<20}  {}",
                        v.version,
                        v.creation_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
                        v.aliases.join(","),
                        v.description.as_deref().unwrap_or_default()
                    )?;
                }
                Ok(())
            }
            Self::Purged(report) => {
                writeln!(f, "Deleted versions: {:?}", report.deleted)?;
                writeln!(f, "Kept aliased versions: {:?}", report.skipped)
            }
        }
    }
}

/// Result of [`App::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// The state machine, with tags.
    pub state_machine: StateMachine,
    /// The `current` alias, if it exists.
    pub current: Option<Alias>,
    /// Owned rules targeting `current`.
    pub rules: Vec<Rule>,
    /// Owned schedules targeting `current`.
    pub schedules: Vec<Schedule>,
    /// Labels of matching triggers not managed by stepctl.
    pub unowned: Vec<String>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sm = &self.state_machine;
        writeln!(f, "StateMachine: {}", sm.name)?;
        writeln!(f, "  Arn:     {}", sm.arn.as_deref().unwrap_or_default())?;
        writeln!(f, "  Status:  {}", sm.status.map_or("UNKNOWN", |s| s.as_str()))?;
        writeln!(f, "  Type:    {:?}", sm.machine_type)?;
        if let Some(created) = sm.creation_date {
            writeln!(f, "  Created: {}", created.to_rfc3339())?;
        }
        match &self.current {
            Some(alias) => {
                for route in &alias.routing {
                    writeln!(f, "  Alias {}: {} ({}%)", alias.name, route.version_arn, route.weight)?;
                }
            }
            None => writeln!(f, "  Alias {CURRENT_ALIAS}: not found")?,
        }
        for rule in &self.rules {
            writeln!(f, "Rule: {} [{}]", rule.name, rule.state.as_str())?;
        }
        for schedule in &self.schedules {
            writeln!(f, "Schedule: {} [{}]", schedule.name, schedule.state.as_str())?;
        }
        for label in &self.unowned {
            writeln!(f, "Unmanaged: {label}")?;
        }
        Ok(())
    }
}

/// Result of [`App::delete`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    /// The state machine ARN, if it existed.
    pub state_machine: Option<String>,
    /// Labels of owned triggers deleted.
    pub triggers: Vec<String>,
    /// True if nothing was deleted.
    pub dry_run: bool,
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        let Some(arn) = &self.state_machine else {
            return writeln!(f, "{prefix}Nothing to delete");
        };
        for label in &self.triggers {
            writeln!(f, "{prefix}Delete {label}")?;
        }
        writeln!(f, "{prefix}Delete {arn}")
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution: {}", self.execution_arn)?;
        writeln!(f, "  Status: {:?}", self.status)?;
        if let Some(output) = &self.output {
            writeln!(f, "  Output: {output}")?;
        }
        Ok(())
    }
}
