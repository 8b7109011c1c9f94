//! Schedules as reconcilable triggers.

use std::sync::Arc;

use async_trait::async_trait;
use stepctl_core::Tags;
use stepctl_remote::{collect_all, Schedule, ScheduleApi};

use super::{TriggerBackend, TriggerResource};
use crate::error::{DeployError, Result};

impl TriggerResource for Schedule {
    const KIND: &'static str = "schedule";

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn bind(&mut self, target_arn: &str) {
        self.target.arn = target_arn.to_string();
    }

    fn sync_state(&mut self, live: &Self) {
        self.state = live.state;
    }
}

/// Reconciles schedules through a [`ScheduleApi`].
pub struct ScheduleBackend<C> {
    remote: Arc<C>,
}

impl<C: ScheduleApi> ScheduleBackend<C> {
    /// Create a backend over `remote`.
    #[must_use]
    pub const fn new(remote: Arc<C>) -> Self {
        Self { remote }
    }

    async fn describe(&self, group_name: Option<&str>, name: &str) -> Result<Schedule> {
        let mut schedule = self
            .remote
            .get_schedule(group_name, name)
            .await
            .map_err(DeployError::remote("get schedule", name))?;
        if let Some(arn) = &schedule.arn {
            schedule.tags = self
                .remote
                .list_tags_for_resource(arn)
                .await
                .map_err(DeployError::remote("list tags", name))?;
        }
        Ok(schedule)
    }
}

#[async_trait]
impl<C: ScheduleApi> TriggerBackend for ScheduleBackend<C> {
    type Resource = Schedule;

    async fn find_by_target(&self, target_arn: &str) -> Result<Vec<Schedule>> {
        let summaries = collect_all(|token| self.remote.list_schedules(token))
            .await
            .map_err(DeployError::remote("list schedules", target_arn))?;

        let mut schedules = Vec::new();
        for summary in summaries.iter().filter(|s| s.target_arn == target_arn) {
            schedules.push(
                self.describe(summary.group_name.as_deref(), &summary.name)
                    .await?,
            );
        }
        Ok(schedules)
    }

    async fn find_declared(&self, declared: &Schedule) -> Result<Option<Schedule>> {
        match self
            .describe(declared.group_name.as_deref(), &declared.name)
            .await
        {
            Ok(schedule) => Ok(Some(schedule)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn deploy(
        &self,
        _target_arn: &str,
        desired: &Schedule,
        current: Option<&Schedule>,
    ) -> Result<u32> {
        let name = desired.name.as_str();
        let arn = if current.is_some() {
            self.remote
                .update_schedule(desired)
                .await
                .map_err(DeployError::remote("update schedule", name))?
        } else {
            self.remote
                .create_schedule(desired)
                .await
                .map_err(DeployError::remote("create schedule", name))?
        };

        self.remote
            .tag_resource(&arn, &desired.tags)
            .await
            .map_err(DeployError::remote("tag schedule", name))?;
        Ok(0)
    }

    async fn delete(&self, schedule: &Schedule) -> Result<()> {
        self.remote
            .delete_schedule(schedule.group_name.as_deref(), &schedule.name)
            .await
            .map_err(DeployError::remote("delete schedule", &schedule.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use stepctl_remote::{FakeCloud, FlexibleTimeWindow, ScheduleTarget, TriggerState};

    const TARGET: &str = "arn:aws:states:us-east-1:123456789012:stateMachine:orders:current";

    fn schedule(name: &str, expression: &str, tags: Tags) -> Schedule {
        Schedule {
            name: name.to_string(),
            schedule_expression: expression.to_string(),
            flexible_time_window: FlexibleTimeWindow::off(),
            target: ScheduleTarget {
                arn: TARGET.to_string(),
                role_arn: "arn:aws:iam::123456789012:role/scheduler".to_string(),
                input: None,
            },
            tags,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn finds_schedules_by_target_with_tags() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.seed_schedule(schedule("a", "rate(1 hour)", Tags::new().with_ownership()));
        cloud.seed_schedule(schedule("b", "rate(2 hours)", Tags::new()));
        let mut elsewhere = schedule("c", "rate(3 hours)", Tags::new().with_ownership());
        elsewhere.target.arn = "arn:other".to_string();
        cloud.seed_schedule(elsewhere);

        let backend = ScheduleBackend::new(Arc::clone(&cloud));
        let found = backend.find_by_target(TARGET).await.unwrap();

        let names: Vec<_> = found.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(found[0].tags.is_managed());
        assert!(!found[1].tags.is_managed());
    }

    #[tokio::test]
    async fn reconcile_updates_preserving_state_and_creates_missing() {
        let cloud = Arc::new(FakeCloud::new());
        let mut live = schedule("nightly", "cron(0 0 * * ? *)", Tags::new().with_ownership());
        live.state = TriggerState::Disabled;
        cloud.seed_schedule(live);

        let declared = vec![
            schedule("nightly", "cron(0 1 * * ? *)", Tags::new().with_ownership()),
            schedule("hourly", "rate(1 hour)", Tags::new().with_ownership()),
        ];

        let reconciler = Reconciler::new(ScheduleBackend::new(Arc::clone(&cloud)));
        let plan = reconciler.plan(TARGET, &declared).await.unwrap();
        assert_eq!(plan.change.len(), 1);
        assert_eq!(plan.add.len(), 1);

        let report = reconciler.apply(TARGET, &plan).await.unwrap();
        assert_eq!(report.failed_entry_count, 0);

        let nightly = cloud.schedule(None, "nightly").unwrap();
        assert_eq!(nightly.schedule_expression, "cron(0 1 * * ? *)");
        assert_eq!(nightly.state, TriggerState::Disabled);

        let hourly = cloud.schedule(None, "hourly").unwrap();
        assert!(hourly.tags.is_managed());
        assert_eq!(hourly.target.arn, TARGET);
    }

    #[tokio::test]
    async fn undeclared_owned_schedule_is_deleted() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.seed_schedule(schedule("stale", "rate(1 day)", Tags::new().with_ownership()));

        let reconciler = Reconciler::new(ScheduleBackend::new(Arc::clone(&cloud)));
        let plan = reconciler.plan(TARGET, &[]).await.unwrap();
        reconciler.apply(TARGET, &plan).await.unwrap();

        assert!(cloud.schedule(None, "stale").is_none());
        assert!(cloud.calls().contains(&"delete_schedule stale".to_string()));
    }
}
