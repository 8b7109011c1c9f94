//! Deployment engine for stepctl.
//!
//! This crate converges a state machine and its triggers to a declared
//! configuration:
//!
//! - **Lifecycle**: create or update with publish, wait for `ACTIVE`, route
//!   the `current` alias, roll back and purge versions ([`LifecycleManager`])
//! - **Reconciliation**: diff and apply event rules and schedules bound to
//!   `current`, touching only resources tagged `ManagedBy=stepctl`
//!   ([`Reconciler`])
//! - **Workflows**: deploy, rollback, diff, versions, status, delete and
//!   execute over one configuration ([`App`])
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │   App (workflows, reports)   │
//!                 └──────────────────────────────┘
//!                   │            │            │
//!                   ▼            ▼            ▼
//!        ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!        │  Lifecycle   │ │  Reconciler  │ │  Execution   │
//!        │   Manager    │ │ rules/scheds │ │    Runner    │
//!        └──────────────┘ └──────────────┘ └──────────────┘
//!                   │            │            │
//!                   ▼            ▼            ▼
//!        ┌────────────────────────────────────────────────┐
//!        │          stepctl-remote ports (async)          │
//!        └────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stepctl_deploy::{App, AppOptions, DeployConfig, DeployOptions};
//! use stepctl_remote::http::{build_http_client, HttpRuleApi, HttpScheduleApi, HttpStateMachineApi};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeployConfig::load(Path::new("stepctl.yaml"))?;
//! let endpoint = config.endpoint_url.clone().unwrap_or_default();
//! let client = build_http_client(Duration::from_secs(30))?;
//!
//! let app = App::new(
//!     config,
//!     Arc::new(HttpStateMachineApi::new(client.clone(), &endpoint)),
//!     Arc::new(HttpRuleApi::new(client.clone(), &endpoint)),
//!     Arc::new(HttpScheduleApi::new(client, &endpoint)),
//!     AppOptions::default(),
//! );
//! let report = app.deploy(&DeployOptions::default()).await?;
//! print!("{report}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod app;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod diff;
pub mod error;
pub mod execution;
pub mod manager;
pub mod reconcile;

pub use app::{
    state_machine_snapshot, App, AppOptions, DeleteReport, DeployOptions, DeployReport,
    StatusReport, VersionsReport,
};
pub use cache::Cache;
pub use config::DeployConfig;
pub use diff::{DiffFormat, DiffOptions};
pub use error::{DeployError, Result};
pub use execution::{ExecutionConfig, ExecutionOutcome, ExecutionRequest, ExecutionRunner};
pub use manager::{
    DeployOutput, LifecycleManager, ManagerConfig, PurgeReport, RollbackOutcome, VersionInfo,
};
pub use reconcile::{
    ApplyReport, ReconcilePlan, Reconciler, RuleBackend, ScheduleBackend, TriggerBackend,
    TriggerResource,
};

// Re-export commonly used types from dependencies for convenience
pub use stepctl_core::{Qualifier, Tags, CURRENT_ALIAS};
pub use tokio_util::sync::CancellationToken;
