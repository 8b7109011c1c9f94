//! Starting and waiting on executions of the deployed state machine.
//!
//! Executions always target the `current` alias. When waiting, the runner
//! polls on a fixed interval. If the caller cancels, it makes one attempt to
//! stop the execution, bounded by a grace timeout, and then reports
//! [`DeployError::Cancelled`] whatever the stop call did.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepctl_core::{arn, Qualifier};
use stepctl_remote::{collect_all, Execution, ExecutionControl, ExecutionStatus, HistoryEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DeployError, Result};

/// Error name recorded on executions stopped by cancellation.
pub const CANCEL_ERROR: &str = "stepctl.Cancelled";

/// Polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Upper bound on the stop call made after cancellation.
    pub stop_grace: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// What to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// JSON input.
    pub input: String,
    /// Execution name; a random one when unset.
    pub name: Option<String>,
    /// Wait for the execution to finish.
    pub wait: bool,
}

/// Result of [`ExecutionRunner::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    /// Execution ARN.
    pub execution_arn: String,
    /// Execution name.
    pub name: String,
    /// Terminal status, or `RUNNING` when not waited on.
    pub status: ExecutionStatus,
    /// Output, when succeeded.
    pub output: Option<String>,
}

/// Starts executions and optionally waits for them.
pub struct ExecutionRunner<X: ExecutionControl> {
    remote: Arc<X>,
    config: ExecutionConfig,
}

impl<X: ExecutionControl> ExecutionRunner<X> {
    /// Create a runner.
    #[must_use]
    pub const fn new(remote: Arc<X>, config: ExecutionConfig) -> Self {
        Self { remote, config }
    }

    /// Start an execution of `state_machine_arn` through its `current` alias.
    ///
    /// With `request.wait` the call returns once the execution has finished.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::ExecutionFailed`] if the execution ends failed,
    /// timed out or aborted, [`DeployError::Cancelled`] if `cancel` fires while
    /// waiting, or a remote error.
    pub async fn run(
        &self,
        state_machine_arn: &str,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let target = arn::qualify(state_machine_arn, &Qualifier::current());
        let name = request
            .name
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let started = self
            .remote
            .start_execution(&target, &name, &request.input)
            .await
            .map_err(DeployError::remote("start execution", target.as_str()))?;
        info!(
            execution = %started.execution_arn,
            started = %started.start_date,
            "Execution started"
        );

        if !request.wait {
            return Ok(ExecutionOutcome {
                execution_arn: started.execution_arn,
                name,
                status: ExecutionStatus::Running,
                output: None,
            });
        }

        let execution = self.wait(&started.execution_arn, cancel).await?;
        Ok(ExecutionOutcome {
            execution_arn: execution.execution_arn,
            name: execution.name,
            status: execution.status,
            output: execution.output,
        })
    }

    /// Poll an execution until it leaves `RUNNING`.
    ///
    /// # Errors
    ///
    /// See [`ExecutionRunner::run`].
    pub async fn wait(&self, execution_arn: &str, cancel: &CancellationToken) -> Result<Execution> {
        loop {
            if cancel.is_cancelled() {
                return Err(self.abort(execution_arn).await);
            }

            let execution = self
                .remote
                .describe_execution(execution_arn)
                .await
                .map_err(DeployError::remote("describe execution", execution_arn))?;
            debug!(execution = %execution_arn, status = ?execution.status, "Polled execution");

            if execution.status.is_terminal() {
                return finished(execution);
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(self.abort(execution_arn).await),
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Read the full event history of an execution.
    ///
    /// # Errors
    ///
    /// Returns an error if a history page cannot be read.
    pub async fn history(&self, execution_arn: &str) -> Result<Vec<HistoryEvent>> {
        collect_all(|token| self.remote.get_execution_history(execution_arn, token))
            .await
            .map_err(DeployError::remote("get execution history", execution_arn))
    }

    // Stop is best effort: the caller always gets `Cancelled` back.
    async fn abort(&self, execution_arn: &str) -> DeployError {
        warn!(execution = %execution_arn, "Cancelled, stopping execution");
        let stop = self
            .remote
            .stop_execution(execution_arn, CANCEL_ERROR, "cancelled by stepctl");
        match tokio::time::timeout(self.config.stop_grace, stop).await {
            Ok(Ok(())) => info!(execution = %execution_arn, "Execution stopped"),
            Ok(Err(e)) => warn!(execution = %execution_arn, error = %e, "Failed to stop execution"),
            Err(_) => warn!(
                execution = %execution_arn,
                grace = ?self.config.stop_grace,
                "Timed out stopping execution"
            ),
        }
        DeployError::Cancelled
    }
}

fn finished(execution: Execution) -> Result<Execution> {
    if execution.status.is_failure() {
        return Err(DeployError::ExecutionFailed {
            arn: execution.execution_arn,
            status: execution.status,
            error: execution.error.unwrap_or_default(),
            cause: execution.cause.unwrap_or_default(),
        });
    }
    info!(execution = %execution.execution_arn, status = ?execution.status, "Execution finished");
    Ok(execution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepctl_remote::{FakeCloud, StateMachine};

    fn setup() -> (Arc<FakeCloud>, String) {
        let cloud = Arc::new(FakeCloud::new());
        let arn = cloud.seed_state_machine(
            StateMachine {
                name: "orders".into(),
                definition: "{}".into(),
                ..Default::default()
            },
            1,
        );
        cloud.seed_alias(&arn, "current", 1);
        (cloud, arn)
    }

    fn request(wait: bool) -> ExecutionRequest {
        ExecutionRequest {
            input: "{}".into(),
            name: Some("run-1".into()),
            wait,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_succeeded() {
        let (cloud, arn) = setup();
        cloud.script_execution(ExecutionStatus::Succeeded, 3);
        let runner = ExecutionRunner::new(Arc::clone(&cloud), ExecutionConfig::default());

        let outcome = runner
            .run(&arn, &request(true), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Succeeded);
        assert_eq!(outcome.output.as_deref(), Some("{}"));
        assert_eq!(outcome.name, "run-1");
        assert_eq!(runner.history(&outcome.execution_arn).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn without_wait_returns_running() {
        let (cloud, arn) = setup();
        let runner = ExecutionRunner::new(Arc::clone(&cloud), ExecutionConfig::default());

        let outcome = runner
            .run(&arn, &ExecutionRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Running);
        assert!(Uuid::parse_str(&outcome.name).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_maps_to_execution_failed() {
        let (cloud, arn) = setup();
        cloud.script_execution(ExecutionStatus::TimedOut, 1);
        let runner = ExecutionRunner::new(Arc::clone(&cloud), ExecutionConfig::default());

        let err = runner
            .run(&arn, &request(true), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::ExecutionFailed { status: ExecutionStatus::TimedOut, ref error, .. }
                if error == "States.TaskFailed"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_execution() {
        let (cloud, arn) = setup();
        cloud.script_execution(ExecutionStatus::Succeeded, 1_000);
        let runner = ExecutionRunner::new(Arc::clone(&cloud), ExecutionConfig::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = runner.run(&arn, &request(true), &cancel).await.unwrap_err();

        assert!(matches!(err, DeployError::Cancelled));
        assert_eq!(cloud.stopped_executions().len(), 1);
    }
}
