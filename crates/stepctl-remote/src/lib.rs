//! Remote control-plane access for stepctl.
//!
//! This crate defines the ports the deployment engine talks through and
//! ships the adapters behind them:
//!
//! - **Ports**: [`StateMachineCatalog`], [`VersionRegistry`], [`ExecutionControl`],
//!   [`RuleApi`] and [`ScheduleApi`], one async trait per remote concern
//! - **HTTP adapters**: JSON-over-HTTP clients for each port (see [`http`])
//! - **Pagination**: [`paginate`] turns token-paged listings into a stream
//! - **Retry**: [`RetryPolicy`] bounded exponential backoff
//! - **Fake cloud**: an in-memory implementation of every port, available
//!   with the `test-utils` feature
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use stepctl_remote::http::{build_http_client, HttpStateMachineApi};
//! use stepctl_remote::StateMachineCatalog;
//!
//! # async fn example() -> stepctl_remote::Result<()> {
//! let client = build_http_client(Duration::from_secs(30))?;
//! let api = HttpStateMachineApi::new(client, "http://localhost:4566");
//! let page = api.list_state_machines(None).await?;
//! for item in page.items {
//!     println!("{} {}", item.name, item.arn);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod events;
pub mod http;
pub mod paginate;
pub mod ports;
pub mod retry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use error::{RemoteError, Result};
pub use events::{
    FlexibleTimeWindow, DEFAULT_EVENT_BUS, DEFAULT_SCHEDULE_GROUP, Rule, RuleTarget, Schedule, ScheduleSummary, ScheduleTarget,
    TargetWriteOutcome, TriggerState,
};
pub use paginate::{collect_all, paginate, Page};
pub use ports::{ExecutionControl, RuleApi, ScheduleApi, StateMachineCatalog, VersionRegistry};
pub use retry::{Attempts, RetryPolicy};
pub use types::{
    Alias, AliasListItem, Execution, ExecutionStatus, HistoryEvent, LogLevel,
    LoggingConfiguration, PublishedVersion, RoutingEntry, StartedExecution, StateMachine,
    StateMachineListItem, StateMachineStatus, StateMachineType, TracingConfiguration,
    VersionListItem,
};

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeCloud;
