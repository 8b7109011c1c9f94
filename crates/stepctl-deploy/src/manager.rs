//! Version and alias lifecycle of a state machine.
//!
//! The [`LifecycleManager`] owns every write to a state machine: create or
//! update with publish, the wait for `ACTIVE`, routing of the `current`
//! alias, rollback and version purge.
//!
//! # Ordering
//!
//! - Deploy: tag merge, publish, wait for `ACTIVE`, then route `current`.
//!   Traffic is never routed to a version that is not active yet.
//! - Rollback: `current` is repointed before the abandoned version is
//!   deleted, so a version is never deleted while `current` still points at it.
//!
//! # Version deletion
//!
//! Deletes retry on conflicts whose only referencing alias is `current`,
//! since that reference clears once the alias update propagates. Any other
//! referencing alias makes the delete a silent skip.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stepctl_core::{arn, Qualifier, Tags, CURRENT_ALIAS};
use stepctl_remote::{
    collect_all, Alias, RemoteError, RetryPolicy, RoutingEntry, StateMachine, StateMachineCatalog,
    VersionListItem, VersionRegistry,
};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::conflict::referenced_aliases;
use crate::error::{DeployError, Result};

/// Settings for the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Policy for polling until a state machine is `ACTIVE`.
    pub wait_policy: RetryPolicy,
    /// Policy for deleting a version that is still referenced by `current`.
    pub delete_policy: RetryPolicy,
    /// Expiry for alias and version lookups. `None` keeps them until invalidated.
    pub cache_ttl: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            wait_policy: RetryPolicy::wait_for_active(),
            delete_policy: RetryPolicy::delete_version(),
            cache_ttl: None,
        }
    }
}

/// Result of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutput {
    /// Unqualified state machine ARN.
    pub state_machine_arn: String,
    /// ARN of the version that was published.
    pub version_arn: String,
    /// When the version was published.
    pub update_date: DateTime<Utc>,
    /// True if the state machine was created by this deploy.
    pub created: bool,
}

/// Result of a rollback request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RollbackOutcome {
    /// The state machine is being deleted; nothing was done.
    Deleting,
    /// `current` routes to more than one version; rollback is left to the operator.
    MultipleRoutes(usize),
    /// `current` is at version 1 or lower.
    NothingToRollBack,
    /// `current` was (or, in a dry run, would be) moved to an older version.
    RolledBack {
        /// Version `current` pointed at.
        from: u64,
        /// Version `current` points at now.
        to: u64,
        /// Whether `from` was deleted.
        deleted: bool,
        /// True if no write was made.
        dry_run: bool,
    },
}

/// A published version with the aliases routing to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Version number.
    pub version: u64,
    /// Version-qualified ARN.
    pub arn: String,
    /// When the version was published.
    pub creation_date: Option<DateTime<Utc>>,
    /// Revision identifier of the snapshot.
    pub revision_id: Option<String>,
    /// Description given at publish time.
    pub description: Option<String>,
    /// Names of aliases routing to this version.
    pub aliases: Vec<String>,
}

/// Versions deleted and skipped by a purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Versions that were deleted.
    pub deleted: Vec<u64>,
    /// Versions kept because an alias references them.
    pub skipped: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeleteOutcome {
    Deleted,
    Referenced,
}

/// Manages versions and the `current` alias of state machines.
pub struct LifecycleManager<R> {
    remote: Arc<R>,
    config: ManagerConfig,
    arns: Cache<String, String>,
    aliases: Cache<String, Vec<Alias>>,
    versions: Cache<String, Vec<VersionListItem>>,
    alias_descriptions: Cache<String, Alias>,
    version_details: Cache<String, StateMachine>,
}

impl<R> LifecycleManager<R>
where
    R: StateMachineCatalog + VersionRegistry,
{
    /// Create a manager over the given remote.
    #[must_use]
    pub fn new(remote: Arc<R>, config: ManagerConfig) -> Self {
        Self {
            remote,
            config,
            arns: Cache::new(),
            aliases: expiring(config.cache_ttl),
            versions: expiring(config.cache_ttl),
            alias_descriptions: expiring(config.cache_ttl),
            // published versions are immutable
            version_details: Cache::new(),
        }
    }

    /// Create a manager with default settings.
    #[must_use]
    pub fn with_defaults(remote: Arc<R>) -> Self {
        Self::new(remote, ManagerConfig::default())
    }

    /// Get the remote used by this manager.
    #[must_use]
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Resolve a state machine name to its unqualified ARN.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::NotFound` if no state machine has that name.
    pub async fn get_arn(&self, name: &str) -> Result<String> {
        if let Some(arn) = self.arns.get(&name.to_string()) {
            return Ok(arn);
        }

        let listed = collect_all(|token| self.remote.list_state_machines(token))
            .await
            .map_err(DeployError::remote("list state machines", name))?;
        let found = listed
            .into_iter()
            .find(|item| item.name == name)
            .ok_or_else(|| DeployError::NotFound {
                kind: "state machine",
                name: name.to_string(),
            })?;

        self.arns.insert(name.to_string(), found.arn.clone());
        Ok(found.arn)
    }

    /// Describe a state machine by name or ARN, including its tags.
    ///
    /// With a qualifier the alias or version snapshot is described instead of
    /// the latest configuration.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the state machine or qualifier is absent.
    pub async fn describe(
        &self,
        name_or_arn: &str,
        qualifier: Option<&Qualifier>,
    ) -> Result<StateMachine> {
        let arn = self.resolve(name_or_arn).await?;
        let target = qualifier.map_or_else(|| arn.clone(), |q| arn::qualify(&arn, q));

        let mut described = self
            .remote
            .describe_state_machine(&target)
            .await
            .map_err(DeployError::remote("describe state machine", &target))?;
        described.tags = self
            .remote
            .list_tags_for_resource(&arn)
            .await
            .map_err(DeployError::remote("list tags", &arn))?;
        Ok(described)
    }

    /// Describe an alias of a state machine.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the alias does not exist.
    pub async fn describe_alias(&self, name_or_arn: &str, alias: &str) -> Result<Alias> {
        let arn = self.resolve(name_or_arn).await?;
        self.describe_alias_arn(&arn::qualify(&arn, &Qualifier::alias(alias)))
            .await
    }

    /// List all aliases of a state machine with their routing.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or describing an alias fails.
    pub async fn list_aliases(&self, name_or_arn: &str) -> Result<Vec<Alias>> {
        let arn = self.resolve(name_or_arn).await?;
        self.aliases_of(&arn).await
    }

    async fn resolve(&self, name_or_arn: &str) -> Result<String> {
        if name_or_arn.starts_with("arn:") {
            Ok(arn::unqualify(name_or_arn).to_string())
        } else {
            self.get_arn(name_or_arn).await
        }
    }

    async fn describe_alias_arn(&self, alias_arn: &str) -> Result<Alias> {
        self.alias_descriptions
            .get_or_try_insert_with(alias_arn.to_string(), || async {
                self.remote
                    .describe_alias(alias_arn)
                    .await
                    .map_err(DeployError::remote("describe alias", alias_arn))
            })
            .await
    }

    async fn aliases_of(&self, arn: &str) -> Result<Vec<Alias>> {
        self.aliases
            .get_or_try_insert_with(arn.to_string(), || async {
                let listed = collect_all(|token| self.remote.list_aliases(arn, token))
                    .await
                    .map_err(DeployError::remote("list aliases", arn))?;
                let mut aliases = Vec::with_capacity(listed.len());
                for item in listed {
                    aliases.push(self.describe_alias_arn(&item.arn).await?);
                }
                Ok(aliases)
            })
            .await
    }

    async fn versions_of(&self, arn: &str) -> Result<Vec<VersionListItem>> {
        self.versions
            .get_or_try_insert_with(arn.to_string(), || async {
                collect_all(|token| self.remote.list_versions(arn, token))
                    .await
                    .map_err(DeployError::remote("list versions", arn))
            })
            .await
    }

    fn invalidate(&self, arn: &str) {
        self.aliases.invalidate(&arn.to_string());
        self.versions.invalidate(&arn.to_string());
        self.alias_descriptions
            .invalidate(&arn::qualify(arn, &Qualifier::current()));
    }

    // =========================================================================
    // Deploy
    // =========================================================================

    /// Create or update a state machine, publish a version and route
    /// `current` to it.
    ///
    /// Existing tags are preserved unless `desired` sets the same key; the
    /// ownership tag is always added.
    ///
    /// # Errors
    ///
    /// Returns an error if any remote write fails, if describing returns
    /// access denied, or if the state machine does not become active.
    pub async fn deploy(
        &self,
        desired: &StateMachine,
        version_description: Option<&str>,
    ) -> Result<DeployOutput> {
        let name = desired.name.as_str();
        let existing = match self.get_arn(name).await {
            Ok(arn) => Some(arn),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let mut tags = match &existing {
            Some(arn) => self
                .remote
                .list_tags_for_resource(arn)
                .await
                .map_err(DeployError::remote("list tags", arn))?,
            None => Tags::new(),
        };
        tags.merge(&desired.tags);
        let mut desired = desired.clone();
        desired.tags = tags.with_ownership();

        let published = match &existing {
            None => {
                info!(state_machine = %name, "Creating state machine");
                self.remote
                    .create_state_machine(&desired, version_description)
                    .await
                    .map_err(DeployError::remote("create state machine", name))?
            }
            Some(arn) => {
                info!(state_machine = %name, "Updating state machine");
                let published = self
                    .remote
                    .update_state_machine(arn, &desired, version_description)
                    .await
                    .map_err(DeployError::remote("update state machine", arn))?;
                self.remote
                    .tag_resource(arn, &desired.tags)
                    .await
                    .map_err(DeployError::remote("tag state machine", arn))?;
                published
            }
        };

        let arn = published.state_machine_arn.clone();
        self.arns.insert(name.to_string(), arn.clone());
        info!(version_arn = %published.version_arn, "Published version");

        self.wait_for_active(&arn).await?;
        self.route_current(&arn, &published.version_arn).await?;

        Ok(DeployOutput {
            state_machine_arn: arn,
            version_arn: published.version_arn,
            update_date: published.timestamp,
            created: existing.is_none(),
        })
    }

    async fn wait_for_active(&self, arn: &str) -> Result<()> {
        let mut attempts = self.config.wait_policy.start();
        while attempts.next().await {
            match self.remote.describe_state_machine(arn).await {
                Ok(sm) if sm.is_active() => {
                    debug!(arn = %arn, attempt = attempts.attempt(), "State machine is active");
                    return Ok(());
                }
                Ok(sm) => {
                    debug!(
                        arn = %arn,
                        status = sm.status.map_or("UNKNOWN", |s| s.as_str()),
                        "Waiting for state machine to become active"
                    );
                }
                Err(e) if e.is_access_denied() => {
                    return Err(DeployError::remote("describe state machine", arn)(e));
                }
                Err(e) => {
                    warn!(arn = %arn, error = %e, "Describe failed while waiting, retrying");
                }
            }
        }
        Err(DeployError::WaitTimeout {
            arn: arn.to_string(),
            attempts: attempts.attempt(),
        })
    }

    /// Point `current` at a single version with full weight.
    async fn route_current(&self, arn: &str, version_arn: &str) -> Result<()> {
        let alias_arn = arn::qualify(arn, &Qualifier::current());
        let routing = [RoutingEntry::full(version_arn)];

        match self.describe_alias_arn(&alias_arn).await {
            Ok(_) => {
                self.remote
                    .update_alias(&alias_arn, None, &routing)
                    .await
                    .map_err(DeployError::remote("update alias", &alias_arn))?;
            }
            Err(e) if e.is_not_found() => {
                self.remote
                    .create_alias(CURRENT_ALIAS, Some("managed by stepctl"), &routing)
                    .await
                    .map_err(DeployError::remote("create alias", &alias_arn))?;
            }
            Err(e) => return Err(e),
        }
        self.invalidate(arn);
        info!(alias = CURRENT_ALIAS, version_arn = %version_arn, "Routed alias");
        Ok(())
    }

    // =========================================================================
    // Rollback
    // =========================================================================

    /// Move `current` to the newest version older than the one it routes to.
    ///
    /// Unless `keep_version` is set, the abandoned version is deleted when no
    /// other alias references it.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::RollbackTargetNotFound` if there is no older
    /// version, or an error if a remote call fails.
    pub async fn rollback(
        &self,
        name: &str,
        keep_version: bool,
        dry_run: bool,
    ) -> Result<RollbackOutcome> {
        let arn = self.get_arn(name).await?;
        let sm = self.describe(&arn, None).await?;
        if sm.is_deleting() {
            info!(state_machine = %name, "State machine is being deleted, skipping rollback");
            return Ok(RollbackOutcome::Deleting);
        }

        let alias = self.describe_alias(&arn, CURRENT_ALIAS).await?;
        let [entry] = alias.routing.as_slice() else {
            info!(
                state_machine = %name,
                routes = alias.routing.len(),
                "Alias routes to several versions, leaving rollback to the operator"
            );
            return Ok(RollbackOutcome::MultipleRoutes(alias.routing.len()));
        };
        let from = arn::parse_version_number(&entry.version_arn)?;
        if from <= 1 {
            info!(state_machine = %name, version = from, "No earlier version to roll back to");
            return Ok(RollbackOutcome::NothingToRollBack);
        }

        let to = self
            .version_numbers(&arn)
            .await?
            .into_iter()
            .filter(|v| *v < from)
            .max()
            .ok_or_else(|| DeployError::RollbackTargetNotFound {
                name: name.to_string(),
                current_version: from,
            })?;

        info!(state_machine = %name, from, to, dry_run, "Rolling back");
        if dry_run {
            return Ok(RollbackOutcome::RolledBack {
                from,
                to,
                deleted: false,
                dry_run,
            });
        }

        self.route_current(&arn, &arn::qualify(&arn, &Qualifier::Version(to)))
            .await?;

        let mut deleted = false;
        if keep_version {
            info!(version = from, "Keeping rolled back version");
        } else {
            let from_arn = entry.version_arn.clone();
            let others: Vec<String> = self
                .aliases_of(&arn)
                .await?
                .into_iter()
                .filter(|a| a.name != CURRENT_ALIAS)
                .filter(|a| a.routing.iter().any(|r| r.version_arn == from_arn))
                .map(|a| a.name)
                .collect();
            if others.is_empty() {
                deleted = self.delete_version(&from_arn).await? == DeleteOutcome::Deleted;
            } else {
                info!(
                    version = from,
                    aliases = ?others,
                    "Version is referenced by other aliases, not deleting"
                );
            }
        }

        Ok(RollbackOutcome::RolledBack {
            from,
            to,
            deleted,
            dry_run,
        })
    }

    async fn version_numbers(&self, arn: &str) -> Result<Vec<u64>> {
        Ok(self
            .versions_of(arn)
            .await?
            .iter()
            .filter_map(|v| parse_or_warn(&v.arn))
            .collect())
    }

    /// Delete a version, retrying while only `current` still references it.
    async fn delete_version(&self, version_arn: &str) -> Result<DeleteOutcome> {
        let wrap = DeployError::remote("delete version", version_arn);
        let mut attempts = self.config.delete_policy.start();
        let mut last_error = None;

        while attempts.next().await {
            match self.remote.delete_version(version_arn).await {
                Ok(()) => {
                    info!(version_arn = %version_arn, "Deleted version");
                    self.versions
                        .invalidate(&arn::unqualify(version_arn).to_string());
                    return Ok(DeleteOutcome::Deleted);
                }
                Err(RemoteError::Conflict(message)) => match referenced_aliases(&message) {
                    Some(names) if names.iter().any(|n| n != CURRENT_ALIAS) => {
                        debug!(version_arn = %version_arn, aliases = ?names, "Version still referenced, skipping");
                        return Ok(DeleteOutcome::Referenced);
                    }
                    Some(names) if !names.is_empty() => {
                        debug!(
                            version_arn = %version_arn,
                            attempt = attempts.attempt(),
                            "Alias update not yet visible, retrying delete"
                        );
                        last_error = Some(RemoteError::Conflict(message));
                    }
                    _ => return Err(wrap(RemoteError::Conflict(message))),
                },
                Err(e) if e.is_retriable() => {
                    warn!(version_arn = %version_arn, error = %e, "Delete failed, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(wrap(e)),
            }
        }

        Err(wrap(last_error.unwrap_or_else(|| {
            RemoteError::InvalidRequest("retry policy allows no attempts".to_string())
        })))
    }

    // =========================================================================
    // Versions
    // =========================================================================

    /// List published versions, newest first, with the aliases routing to each.
    ///
    /// Versions whose ARN does not end in a number are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or describing fails.
    pub async fn list_versions(&self, name_or_arn: &str) -> Result<Vec<VersionInfo>> {
        let arn = self.resolve(name_or_arn).await?;

        let mut by_version: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for alias in self.aliases_of(&arn).await? {
            for route in alias.routing {
                by_version
                    .entry(route.version_arn)
                    .or_default()
                    .insert(alias.name.clone());
            }
        }

        let mut versions = Vec::new();
        for item in self.versions_of(&arn).await? {
            let Some(version) = parse_or_warn(&item.arn) else {
                continue;
            };
            let detail = self.version_detail(&item.arn).await?;
            versions.push(VersionInfo {
                version,
                aliases: by_version
                    .get(&item.arn)
                    .map(|names| names.iter().cloned().collect())
                    .unwrap_or_default(),
                arn: item.arn,
                creation_date: item.creation_date.or(detail.creation_date),
                revision_id: detail.revision_id,
                description: detail.description,
            });
        }

        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    async fn version_detail(&self, version_arn: &str) -> Result<StateMachine> {
        self.version_details
            .get_or_try_insert_with(version_arn.to_string(), || async {
                self.remote
                    .describe_state_machine(version_arn)
                    .await
                    .map_err(DeployError::remote("describe version", version_arn))
            })
            .await
    }

    /// Delete old versions, keeping the newest `keep` and every aliased one.
    ///
    /// Deletion is best effort: every failure is collected and reported
    /// together after all candidates have been tried.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Purge` listing every version that failed to delete.
    pub async fn purge_versions(&self, name_or_arn: &str, keep: usize) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        if keep < 1 {
            debug!("Nothing to purge, keep count below one");
            return Ok(report);
        }

        let versions = self.list_versions(name_or_arn).await?;
        let mut failures = Vec::new();
        for v in versions.iter().skip(keep) {
            if !v.aliases.is_empty() {
                warn!(version = v.version, aliases = ?v.aliases, "Version is aliased, not deleting");
                report.skipped.push(v.version);
                continue;
            }
            match self.delete_version(&v.arn).await {
                Ok(DeleteOutcome::Deleted) => report.deleted.push(v.version),
                Ok(DeleteOutcome::Referenced) => report.skipped.push(v.version),
                Err(e) => failures.push(format!("version {}: {e}", v.version)),
            }
        }

        if failures.is_empty() {
            info!(
                deleted = report.deleted.len(),
                skipped = report.skipped.len(),
                "Purged versions"
            );
            Ok(report)
        } else {
            Err(DeployError::Purge { failures })
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a state machine. Deleting one that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote delete fails.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let arn = match self.get_arn(name).await {
            Ok(arn) => arn,
            Err(e) if e.is_not_found() => {
                info!(state_machine = %name, "State machine already deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match self.remote.delete_state_machine(&arn).await {
            Ok(()) => info!(state_machine = %name, "Deleted state machine"),
            Err(e) if e.is_not_found() => {
                info!(state_machine = %name, "State machine already deleted");
            }
            Err(e) => return Err(DeployError::remote("delete state machine", &arn)(e)),
        }

        self.arns.invalidate(&name.to_string());
        self.invalidate(&arn);
        // a recreated state machine publishes the same version ARNs again
        self.version_details.clear();
        Ok(())
    }
}

fn expiring<K: Eq + std::hash::Hash, V: Clone>(ttl: Option<Duration>) -> Cache<K, V> {
    ttl.map_or_else(Cache::new, Cache::with_ttl)
}

fn parse_or_warn(version_arn: &str) -> Option<u64> {
    match arn::parse_version_number(version_arn) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(version_arn = %version_arn, error = %e, "Skipping malformed version ARN");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepctl_remote::{FakeCloud, StateMachineStatus};

    fn fast() -> ManagerConfig {
        ManagerConfig {
            wait_policy: RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(2), 3),
            delete_policy: RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(2), 3),
            cache_ttl: None,
        }
    }

    fn machine(name: &str) -> StateMachine {
        StateMachine {
            name: name.to_string(),
            definition: r#"{"StartAt":"A","States":{"A":{"Type":"Pass","End":true}}}"#.to_string(),
            role_arn: "arn:aws:iam::123456789012:role/sfn".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deploy_creates_and_routes_current() {
        let cloud = Arc::new(FakeCloud::new());
        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());

        let out = manager.deploy(&machine("orders"), None).await.unwrap();
        assert!(out.created);
        assert_eq!(out.version_arn, format!("{}:1", out.state_machine_arn));

        let routing = cloud
            .alias_routing(&out.state_machine_arn, CURRENT_ALIAS)
            .unwrap();
        assert_eq!(routing, vec![RoutingEntry::full(out.version_arn.clone())]);

        let sm = cloud.state_machine(&out.state_machine_arn).unwrap();
        assert!(sm.tags.is_managed());
    }

    #[tokio::test]
    async fn deploy_preserves_existing_tags() {
        let cloud = Arc::new(FakeCloud::new());
        let mut seeded = machine("orders");
        seeded.tags = [("team", "payments"), ("env", "dev")].into_iter().collect();
        let arn = cloud.seed_state_machine(seeded, 1);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 1);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let mut desired = machine("orders");
        desired.tags = [("env", "prod")].into_iter().collect();
        let out = manager.deploy(&desired, Some("second")).await.unwrap();
        assert!(!out.created);

        let tags = cloud.state_machine(&arn).unwrap().tags;
        assert_eq!(tags.get("team"), Some("payments"));
        assert_eq!(tags.get("env"), Some("prod"));
        assert!(tags.is_managed());

        let calls = cloud.calls();
        let update = calls.iter().position(|c| c.starts_with("update_state_machine")).unwrap();
        let tag = calls.iter().position(|c| c.starts_with("tag_state_machine")).unwrap();
        let alias = calls.iter().position(|c| c.starts_with("update_alias")).unwrap();
        assert!(update < tag && tag < alias);
    }

    #[tokio::test]
    async fn wait_retries_transient_failures() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.push_status(StateMachineStatus::Unknown);
        cloud.fail_next_describe(RemoteError::Throttled("slow down".into()));

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        manager.deploy(&machine("orders"), None).await.unwrap();
    }

    #[tokio::test]
    async fn wait_aborts_on_access_denied() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.fail_next_describe(RemoteError::AccessDenied("no".into()));

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let err = manager.deploy(&machine("orders"), None).await.unwrap_err();
        assert!(err.is_access_denied());
        assert!(!cloud.calls().iter().any(|c| c.contains("alias")));
    }

    #[tokio::test]
    async fn wait_times_out() {
        let cloud = Arc::new(FakeCloud::new());
        for _ in 0..3 {
            cloud.push_status(StateMachineStatus::Unknown);
        }

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let err = manager.deploy(&machine("orders"), None).await.unwrap_err();
        assert!(matches!(err, DeployError::WaitTimeout { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn rollback_no_ops() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 1);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 1);
        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        assert_eq!(
            manager.rollback("orders", false, false).await.unwrap(),
            RollbackOutcome::NothingToRollBack
        );

        let arn = cloud.seed_state_machine(machine("canary"), 3);
        cloud.seed_alias_routing(
            &arn,
            CURRENT_ALIAS,
            vec![
                RoutingEntry {
                    version_arn: format!("{arn}:3"),
                    weight: 90,
                },
                RoutingEntry {
                    version_arn: format!("{arn}:2"),
                    weight: 10,
                },
            ],
        );
        assert_eq!(
            manager.rollback("canary", false, false).await.unwrap(),
            RollbackOutcome::MultipleRoutes(2)
        );
        assert_eq!(cloud.version_numbers(&arn), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rollback_skips_deleting_state_machine() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 2);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 2);
        cloud.push_status(StateMachineStatus::Deleting);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        assert_eq!(
            manager.rollback("orders", false, false).await.unwrap(),
            RollbackOutcome::Deleting
        );
        assert_eq!(cloud.alias_routing(&arn, CURRENT_ALIAS).unwrap()[0].version_arn, format!("{arn}:2"));
    }

    #[tokio::test]
    async fn rollback_dry_run_writes_nothing() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 3);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 3);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let outcome = manager.rollback("orders", false, true).await.unwrap();
        assert_eq!(
            outcome,
            RollbackOutcome::RolledBack {
                from: 3,
                to: 2,
                deleted: false,
                dry_run: true
            }
        );
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn rollback_across_gap_and_keep_version() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 4);
        cloud.delete_version(&format!("{arn}:3")).await.unwrap();
        cloud.seed_alias(&arn, CURRENT_ALIAS, 4);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let outcome = manager.rollback("orders", true, false).await.unwrap();
        assert_eq!(
            outcome,
            RollbackOutcome::RolledBack {
                from: 4,
                to: 2,
                deleted: false,
                dry_run: false
            }
        );
        assert_eq!(cloud.version_numbers(&arn), vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn delete_retries_while_only_current_references() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 3);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 3);
        cloud.script_delete_conflict(&[CURRENT_ALIAS]);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let outcome = manager.rollback("orders", false, false).await.unwrap();
        assert!(matches!(outcome, RollbackOutcome::RolledBack { deleted: true, .. }));
        assert_eq!(cloud.version_numbers(&arn), vec![1, 2]);

        let deletes = cloud
            .calls()
            .iter()
            .filter(|c| c.starts_with("delete_version"))
            .count();
        assert_eq!(deletes, 2);
    }

    #[tokio::test]
    async fn delete_skips_when_other_alias_appears_in_conflict() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 3);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 3);
        cloud.script_delete_conflict(&[CURRENT_ALIAS, "late"]);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let outcome = manager.rollback("orders", false, false).await.unwrap();
        assert!(matches!(outcome, RollbackOutcome::RolledBack { deleted: false, .. }));
        assert_eq!(cloud.version_numbers(&arn), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unparseable_conflict_is_surfaced() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 3);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 3);
        cloud.script_delete_conflict(&[]);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let err = manager.rollback("orders", false, false).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Remote {
                source: RemoteError::Conflict(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_versions_newest_first_with_aliases() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 3);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 3);
        cloud.seed_alias(&arn, "stable", 1);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let versions = manager.list_versions("orders").await.unwrap();
        let numbers: Vec<_> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(versions[0].aliases, vec![CURRENT_ALIAS.to_string()]);
        assert!(versions[1].aliases.is_empty());
        assert_eq!(versions[2].aliases, vec!["stable".to_string()]);
        assert_eq!(versions[2].revision_id.as_deref(), Some("rev-1"));
    }

    #[tokio::test]
    async fn purge_below_one_is_noop() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 3);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let report = manager.purge_versions("orders", 0).await.unwrap();
        assert_eq!(report, PurgeReport::default());
        assert_eq!(cloud.version_numbers(&arn), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn purge_continues_past_failures_and_reports_them() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 4);
        cloud.seed_alias(&arn, CURRENT_ALIAS, 4);
        // an empty alias list cannot be told apart from a garbled message
        cloud.script_delete_conflict(&[]);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        let err = manager.purge_versions("orders", 1).await.unwrap_err();

        let DeployError::Purge { failures } = err else {
            panic!("expected a purge error");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("version 3:"));
        assert_eq!(cloud.version_numbers(&arn), vec![3, 4]);
    }

    #[tokio::test]
    async fn recreated_state_machine_reports_fresh_version_details() {
        let cloud = Arc::new(FakeCloud::new());
        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());

        manager.deploy(&machine("orders"), Some("first")).await.unwrap();
        let before = manager.list_versions("orders").await.unwrap();
        assert_eq!(before[0].description.as_deref(), Some("first"));

        manager.delete("orders").await.unwrap();
        manager.deploy(&machine("orders"), Some("second")).await.unwrap();

        let after = manager.list_versions("orders").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].version, 1);
        assert_eq!(after[0].description.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn caches_are_refreshed_after_own_writes() {
        let cloud = Arc::new(FakeCloud::new());
        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());

        manager.deploy(&machine("orders"), None).await.unwrap();
        assert_eq!(manager.list_versions("orders").await.unwrap().len(), 1);

        manager.deploy(&machine("orders"), None).await.unwrap();
        let versions = manager.list_versions("orders").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].aliases, vec![CURRENT_ALIAS.to_string()]);
        assert!(versions[1].aliases.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(machine("orders"), 1);

        let manager = LifecycleManager::new(Arc::clone(&cloud), fast());
        manager.delete("orders").await.unwrap();
        assert!(cloud.state_machine(&arn).is_none());
        manager.delete("orders").await.unwrap();
    }
}
