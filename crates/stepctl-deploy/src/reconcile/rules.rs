//! Event rules as reconcilable triggers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stepctl_core::Tags;
use stepctl_remote::{collect_all, Rule, RuleApi, RuleTarget};
use tracing::debug;

use super::{TriggerBackend, TriggerResource};
use crate::error::{DeployError, Result};

impl TriggerResource for Rule {
    const KIND: &'static str = "rule";

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn bind(&mut self, target_arn: &str) {
        for target in &mut self.targets {
            target.arn = target_arn.to_string();
        }
    }

    fn sync_state(&mut self, live: &Self) {
        self.state = live.state;
    }

    fn snapshot(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.remove("arn");
            // show patterns as structure rather than an escaped string
            if let Some(pattern) = self
                .event_pattern
                .as_deref()
                .and_then(|p| serde_json::from_str::<Value>(p).ok())
            {
                object.insert("eventPattern".to_string(), pattern);
            }
        }
        value
    }
}

/// Reconciles event rules through a [`RuleApi`].
pub struct RuleBackend<E> {
    remote: Arc<E>,
}

impl<E: RuleApi> RuleBackend<E> {
    /// Create a backend over `remote`.
    #[must_use]
    pub const fn new(remote: Arc<E>) -> Self {
        Self { remote }
    }

    async fn describe(&self, name: &str) -> Result<Rule> {
        let mut rule = self
            .remote
            .describe_rule(name)
            .await
            .map_err(DeployError::remote("describe rule", name))?;
        rule.targets = collect_all(|token| self.remote.list_targets_by_rule(name, token))
            .await
            .map_err(DeployError::remote("list targets", name))?;
        if let Some(arn) = &rule.arn {
            rule.tags = self
                .remote
                .list_tags_for_resource(arn)
                .await
                .map_err(DeployError::remote("list tags", name))?;
        }
        Ok(rule)
    }
}

/// Compute the target writes for `desired` over the live targets.
///
/// With no live targets the declared ones are written. Otherwise every live
/// target aimed at `target_arn` is replaced by the declared target, and its
/// old id removed if the id changed. Targets aimed elsewhere are left alone.
fn target_writes(
    target_arn: &str,
    desired: &[RuleTarget],
    live: &[RuleTarget],
) -> (Vec<RuleTarget>, Vec<String>) {
    let Some(declared) = desired.first() else {
        return (Vec::new(), Vec::new());
    };
    if live.is_empty() {
        return (desired.to_vec(), Vec::new());
    }
    if !live.iter().any(|t| t.arn == target_arn) {
        debug!(target_arn = %target_arn, "No live target for this state machine, adding one");
    }

    let mut removes: Vec<String> = Vec::new();
    for target in live.iter().filter(|t| t.arn == target_arn) {
        if target.id != declared.id && !removes.contains(&target.id) {
            removes.push(target.id.clone());
        }
    }
    (vec![declared.clone()], removes)
}

#[async_trait]
impl<E: RuleApi> TriggerBackend for RuleBackend<E> {
    type Resource = Rule;

    async fn find_by_target(&self, target_arn: &str) -> Result<Vec<Rule>> {
        let names = collect_all(|token| self.remote.list_rule_names_by_target(target_arn, token))
            .await
            .map_err(DeployError::remote("list rules by target", target_arn))?;

        let mut rules = Vec::with_capacity(names.len());
        for name in names {
            rules.push(self.describe(&name).await?);
        }
        Ok(rules)
    }

    async fn find_declared(&self, declared: &Rule) -> Result<Option<Rule>> {
        match self.describe(&declared.name).await {
            Ok(rule) => Ok(Some(rule)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn deploy(&self, target_arn: &str, desired: &Rule, current: Option<&Rule>) -> Result<u32> {
        let name = desired.name.as_str();
        let arn = self
            .remote
            .put_rule(desired)
            .await
            .map_err(DeployError::remote("put rule", name))?;

        let live = current.map(|c| c.targets.as_slice()).unwrap_or_default();
        let (puts, removes) = target_writes(target_arn, &desired.targets, live);

        let mut failed = 0;
        if !puts.is_empty() {
            let outcome = self
                .remote
                .put_targets(name, &puts)
                .await
                .map_err(DeployError::remote("put targets", name))?;
            for entry in &outcome.failed_entries {
                debug!(rule = %name, entry = %entry, "Target rejected");
            }
            failed += outcome.failed_entry_count;
        }
        if !removes.is_empty() {
            let outcome = self
                .remote
                .remove_targets(name, &removes)
                .await
                .map_err(DeployError::remote("remove targets", name))?;
            failed += outcome.failed_entry_count;
        }

        self.remote
            .tag_resource(&arn, &desired.tags)
            .await
            .map_err(DeployError::remote("tag rule", name))?;
        Ok(failed)
    }

    async fn delete(&self, rule: &Rule) -> Result<()> {
        let name = rule.name.as_str();
        let ids: Vec<String> = rule.targets.iter().map(|t| t.id.clone()).collect();
        if !ids.is_empty() {
            self.remote
                .remove_targets(name, &ids)
                .await
                .map_err(DeployError::remote("remove targets", name))?;
        }
        self.remote
            .delete_rule(name)
            .await
            .map_err(DeployError::remote("delete rule", name))
    }
}
