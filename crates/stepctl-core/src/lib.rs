//! Core types and utilities for stepctl.
//!
//! This crate provides the conventions every other stepctl crate relies on:
//!
//! - **Addressing**: qualified state machine ARNs (`<arn>:<alias>` or `<arn>:<version>`)
//!   and version-number parsing
//! - **Ownership**: the `ManagedBy=stepctl` tag that marks a resource as owned
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use stepctl_core::{arn, Qualifier, Tags, CURRENT_ALIAS};
//!
//! let base = "arn:aws:states:us-east-1:123456789012:stateMachine:orders";
//! let current = arn::qualify(base, &Qualifier::alias(CURRENT_ALIAS));
//! assert_eq!(current, format!("{base}:current"));
//!
//! let version = arn::parse_version_number(&format!("{base}:7")).unwrap();
//! assert_eq!(version, 7);
//!
//! let tags = Tags::new().with_ownership();
//! assert!(tags.is_managed());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arn;
pub mod error;
pub mod tags;

pub use arn::{Qualifier, CURRENT_ALIAS};
pub use error::{CoreError, Result};
pub use tags::{Tag, Tags, MANAGED_BY_KEY, TOOL_NAME};
