//! HTTP adapters for the remote ports.
//!
//! - [`HttpStateMachineApi`]: state machines, versions, aliases and executions
//! - [`HttpRuleApi`]: event rules and their targets
//! - [`HttpScheduleApi`]: schedules

mod client;
pub mod events;
pub mod scheduler;
pub mod states;

pub use client::{build_http_client, AwsJsonClient, RestJsonClient};
pub use events::HttpRuleApi;
pub use scheduler::HttpScheduleApi;
pub use states::HttpStateMachineApi;
