//! Reconciliation of trigger resources bound to a state machine.
//!
//! Triggers (event rules and schedules) are found by reverse lookup on the
//! ARN they target, plus any declared name that already exists. Only
//! resources tagged `ManagedBy=stepctl` are owned; anything else that
//! matches is logged and never written.
//!
//! # Flow
//!
//! ```text
//! declared ──bind(target)──▶ desired ──sync_state(current)──┐
//!                                                           ▼
//! remote ──search_related──▶ current ──────────────▶ ReconcilePlan { delete, change, add }
//!                                                           │
//!                                   render (dry run) ◀──────┴──────▶ apply
//! ```
//!
//! The plan lists deletes first, then changes, then adds. Deletes keep the
//! order in which current resources were found; changes and adds keep the
//! declared order.

pub mod rules;
pub mod schedules;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use stepctl_core::Tags;
use tracing::{info, warn};

use crate::diff::{render_json, DiffOptions};
use crate::error::Result;

pub use rules::RuleBackend;
pub use schedules::ScheduleBackend;

/// A trigger resource that can be reconciled.
pub trait TriggerResource: Clone + Serialize + Send + Sync {
    /// Kind used in logs and diff labels, e.g. `rule`.
    const KIND: &'static str;

    /// Unique name of the resource.
    fn name(&self) -> &str;

    /// Tags on the resource.
    fn tags(&self) -> &Tags;

    /// Whether the resource carries the ownership tag.
    fn is_owned(&self) -> bool {
        self.tags().is_managed()
    }

    /// Point the resource at `target_arn`.
    fn bind(&mut self, target_arn: &str);

    /// Copy state that operators may change out of band from `live`.
    fn sync_state(&mut self, live: &Self);

    /// Snapshot used for diffing. Service-assigned identity is left out.
    fn snapshot(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.remove("arn");
        }
        value
    }

    /// Label used in diff headers.
    fn label(&self) -> String {
        format!("{}/{}", Self::KIND, self.name())
    }
}

/// Remote operations for one kind of trigger.
#[async_trait]
pub trait TriggerBackend: Send + Sync {
    /// The resource type handled.
    type Resource: TriggerResource;

    /// Find resources targeting `target_arn`, fully described with tags.
    async fn find_by_target(&self, target_arn: &str) -> Result<Vec<Self::Resource>>;

    /// Describe the live resource with the same identity as `declared`.
    async fn find_declared(&self, declared: &Self::Resource) -> Result<Option<Self::Resource>>;

    /// Write `desired`, replacing `current` if it exists.
    ///
    /// Returns the number of target entries the service rejected.
    async fn deploy(
        &self,
        target_arn: &str,
        desired: &Self::Resource,
        current: Option<&Self::Resource>,
    ) -> Result<u32>;

    /// Delete a resource and its targets.
    async fn delete(&self, resource: &Self::Resource) -> Result<()>;
}

/// Owned and unowned resources related to a target.
#[derive(Debug, Clone)]
pub struct Related<R> {
    /// Owned resources, in the order found.
    pub current: Vec<R>,
    /// Names of matching resources without the ownership tag.
    pub unowned: Vec<String>,
}

/// A resource present on both sides whose snapshot differs.
#[derive(Debug, Clone)]
pub struct Change<R> {
    /// The live resource.
    pub current: R,
    /// The desired resource.
    pub desired: R,
}

/// What a reconciliation would do.
#[derive(Debug, Clone)]
pub struct ReconcilePlan<R> {
    /// Owned resources no longer declared.
    pub delete: Vec<R>,
    /// Declared resources that differ from their live state.
    pub change: Vec<Change<R>>,
    /// Declared resources that do not exist yet.
    pub add: Vec<R>,
    /// Declared resources that already match.
    pub unchanged: Vec<String>,
    /// Declared names held by an unowned resource; never written.
    pub skipped: Vec<String>,
}

impl<R: TriggerResource> ReconcilePlan<R> {
    /// Compute the plan from current and desired resources.
    ///
    /// `desired` is expected to be bound and synced already.
    #[must_use]
    pub fn compute(current: &[R], desired: &[R], unowned: &[String]) -> Self {
        let declared: HashSet<&str> = desired.iter().map(|d| d.name()).collect();
        let unowned: HashSet<&str> = unowned.iter().map(String::as_str).collect();

        let delete = current
            .iter()
            .filter(|c| !declared.contains(c.name()))
            .cloned()
            .collect();

        let mut change = Vec::new();
        let mut add = Vec::new();
        let mut unchanged = Vec::new();
        let mut skipped = Vec::new();
        for d in desired {
            if unowned.contains(d.name()) {
                skipped.push(d.name().to_string());
                continue;
            }
            match current.iter().find(|c| c.name() == d.name()) {
                Some(c) if c.snapshot() == d.snapshot() => unchanged.push(d.name().to_string()),
                Some(c) => change.push(Change {
                    current: c.clone(),
                    desired: d.clone(),
                }),
                None => add.push(d.clone()),
            }
        }

        Self {
            delete,
            change,
            add,
            unchanged,
            skipped,
        }
    }

    /// True if applying the plan would write nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.change.is_empty() && self.add.is_empty()
    }

    /// Render the plan as a diff: deletes, then changes, then adds.
    #[must_use]
    pub fn render(&self, options: DiffOptions) -> String {
        let mut out = String::new();
        for r in &self.delete {
            if let Some(d) = render_json(&r.label(), "/dev/null", &r.snapshot(), &Value::Null, options) {
                out.push_str(&d);
            }
        }
        for c in &self.change {
            let label = c.desired.label();
            if let Some(d) =
                render_json(&label, &label, &c.current.snapshot(), &c.desired.snapshot(), options)
            {
                out.push_str(&d);
            }
        }
        for r in &self.add {
            if let Some(d) = render_json("/dev/null", &r.label(), &Value::Null, &r.snapshot(), options) {
                out.push_str(&d);
            }
        }
        out
    }
}

/// Copy live mutable state onto every desired resource that exists.
///
/// Applying this twice has the same effect as applying it once.
pub fn sync_state<R: TriggerResource>(desired: &mut [R], current: &[R]) {
    for d in desired.iter_mut() {
        if let Some(live) = current.iter().find(|c| c.name() == d.name()) {
            d.sync_state(live);
        }
    }
}

/// Action taken on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Created.
    Add,
    /// Updated in place.
    Change,
    /// Deleted.
    Delete,
}

/// Outcome of applying a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Resources written, in order.
    pub outcomes: Vec<(String, Action)>,
    /// Target entries the service rejected.
    pub failed_entry_count: u32,
}

fn kind<B: TriggerBackend>() -> &'static str {
    <B::Resource as TriggerResource>::KIND
}

/// Reconciles one kind of trigger through a backend.
pub struct Reconciler<B> {
    backend: B,
}

impl<B: TriggerBackend> Reconciler<B> {
    /// Create a reconciler over `backend`.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Find resources related to `target_arn` or sharing a declared identity.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote lookup fails.
    pub async fn search_related(
        &self,
        target_arn: &str,
        declared: &[B::Resource],
    ) -> Result<Related<B::Resource>> {
        let mut found = self.backend.find_by_target(target_arn).await?;
        for d in declared {
            if found.iter().any(|f| f.name() == d.name()) {
                continue;
            }
            if let Some(live) = self.backend.find_declared(d).await? {
                found.push(live);
            }
        }

        let mut related = Related {
            current: Vec::new(),
            unowned: Vec::new(),
        };
        for resource in found {
            if resource.is_owned() {
                related.current.push(resource);
            } else {
                info!(
                    kind = kind::<B>(),
                    name = resource.name(),
                    "Not managed by stepctl, leaving untouched"
                );
                related.unowned.push(resource.name().to_string());
            }
        }
        Ok(related)
    }

    /// Bind, sync and diff `declared` against the live state for `target_arn`.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote lookup fails.
    pub async fn plan(
        &self,
        target_arn: &str,
        declared: &[B::Resource],
    ) -> Result<ReconcilePlan<B::Resource>> {
        let mut desired = declared.to_vec();
        for d in &mut desired {
            d.bind(target_arn);
        }

        let related = self.search_related(target_arn, &desired).await?;
        sync_state(&mut desired, &related.current);

        let plan = ReconcilePlan::compute(&related.current, &desired, &related.unowned);
        for name in &plan.skipped {
            warn!(
                kind = kind::<B>(),
                name = %name,
                "Declared name is held by a resource not managed by stepctl, skipping"
            );
        }
        Ok(plan)
    }

    /// Apply a plan: write changes and additions, then delete what is no
    /// longer declared.
    ///
    /// Rejected target entries are counted, not raised.
    ///
    /// # Errors
    ///
    /// Returns the first remote error, wrapped with the resource name.
    pub async fn apply(
        &self,
        target_arn: &str,
        plan: &ReconcilePlan<B::Resource>,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        for c in &plan.change {
            report.failed_entry_count += self
                .backend
                .deploy(target_arn, &c.desired, Some(&c.current))
                .await?;
            info!(kind = kind::<B>(), name = c.desired.name(), "Updated");
            report
                .outcomes
                .push((c.desired.name().to_string(), Action::Change));
        }
        for r in &plan.add {
            report.failed_entry_count += self.backend.deploy(target_arn, r, None).await?;
            info!(kind = kind::<B>(), name = r.name(), "Created");
            report.outcomes.push((r.name().to_string(), Action::Add));
        }

        self.delete(&plan.delete).await?;
        report.outcomes.extend(
            plan.delete
                .iter()
                .map(|r| (r.name().to_string(), Action::Delete)),
        );

        if report.failed_entry_count > 0 {
            warn!(
                kind = kind::<B>(),
                failed = report.failed_entry_count,
                "Some target entries were rejected"
            );
        }
        Ok(report)
    }

    /// Delete resources one by one, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the remote error, wrapped with the resource name.
    pub async fn delete(&self, resources: &[B::Resource]) -> Result<()> {
        for r in resources {
            self.backend.delete(r).await?;
            info!(kind = kind::<B>(), name = r.name(), "Deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepctl_remote::TriggerState;

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct Toy {
        name: String,
        target: String,
        state: TriggerState,
        body: u32,
        tags: Tags,
    }

    impl TriggerResource for Toy {
        const KIND: &'static str = "toy";

        fn name(&self) -> &str {
            &self.name
        }

        fn tags(&self) -> &Tags {
            &self.tags
        }

        fn bind(&mut self, target_arn: &str) {
            self.target = target_arn.to_string();
        }

        fn sync_state(&mut self, live: &Self) {
            self.state = live.state;
        }
    }

    fn names(toys: &[Toy]) -> Vec<String> {
        toys.iter().map(|t| t.name.clone()).collect()
    }

    fn toy(name: &str, body: u32) -> Toy {
        Toy {
            name: name.to_string(),
            target: "t".to_string(),
            state: TriggerState::Enabled,
            body,
            tags: Tags::new().with_ownership(),
        }
    }

    #[test]
    fn plan_orders_and_partitions() {
        let current = vec![toy("gone-b", 1), toy("same", 1), toy("gone-a", 1), toy("edit", 1)];
        let desired = vec![toy("new-z", 1), toy("edit", 2), toy("same", 1), toy("new-a", 1)];

        let plan = ReconcilePlan::compute(&current, &desired, &[]);

        assert_eq!(names(&plan.delete), ["gone-b", "gone-a"]);
        assert_eq!(plan.change.len(), 1);
        assert_eq!(plan.change[0].desired.body, 2);
        assert_eq!(names(&plan.add), ["new-z", "new-a"]);
        assert_eq!(plan.unchanged, ["same"]);
    }

    #[test]
    fn identical_sides_make_an_empty_plan() {
        let resources = vec![toy("a", 1), toy("b", 2)];
        let plan = ReconcilePlan::compute(&resources, &resources, &[]);
        assert!(plan.is_empty());
        assert!(plan.render(DiffOptions::default()).is_empty());
    }

    #[test]
    fn unowned_declared_names_are_skipped() {
        let plan = ReconcilePlan::compute(&[], &[toy("theirs", 1)], &["theirs".to_string()]);
        assert!(plan.add.is_empty());
        assert_eq!(plan.skipped, ["theirs"]);
    }

    #[test]
    fn sync_state_is_idempotent() {
        let mut live = toy("a", 1);
        live.state = TriggerState::Disabled;
        live.body = 9;
        let current = vec![live];

        let mut once = vec![toy("a", 1), toy("b", 1)];
        sync_state(&mut once, &current);
        let mut twice = once.clone();
        sync_state(&mut twice, &current);

        assert_eq!(once, twice);
        assert_eq!(once[0].state, TriggerState::Disabled);
        assert_eq!(once[0].body, 1);
        assert_eq!(once[1].state, TriggerState::Enabled);
    }

    #[test]
    fn render_lists_delete_change_add() {
        let current = vec![toy("old", 1), toy("edit", 1)];
        let desired = vec![toy("new", 1), toy("edit", 2)];
        let out = ReconcilePlan::compute(&current, &desired, &[]).render(DiffOptions::default());

        let delete = out.find("--- toy/old").unwrap();
        let change = out.find("--- toy/edit").unwrap();
        let add = out.find("+++ toy/new").unwrap();
        assert!(delete < change && change < add);
        assert!(out.contains("-  \"body\": 1,"));
        assert!(out.contains("+  \"body\": 2,"));
    }
}
