//! Error types for deploy workflows.
//!
//! Remote failures are wrapped with the operation and the resource they
//! concern. `NotFound` is frequently a handled branch rather than a failure,
//! so [`DeployError::is_not_found`] looks through the wrapping.

use stepctl_core::CoreError;
use stepctl_remote::{ExecutionStatus, RemoteError};
use thiserror::Error;

/// A result type using `DeployError`.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors that can occur while deploying, rolling back or reconciling.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A named resource does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of resource, e.g. `state machine`.
        kind: &'static str,
        /// Name or ARN that was looked up.
        name: String,
    },

    /// A remote call failed.
    #[error("{op} {resource}: {source}")]
    Remote {
        /// The remote operation.
        op: &'static str,
        /// Name or ARN the operation targeted.
        resource: String,
        /// The underlying remote error.
        #[source]
        source: RemoteError,
    },

    /// There is no older version to roll back to.
    #[error("no version older than {current_version} to roll back to for {name}")]
    RollbackTargetNotFound {
        /// The state machine name.
        name: String,
        /// The version the `current` alias points at.
        current_version: u64,
    },

    /// The state machine did not become active in time.
    #[error("{arn} did not become ACTIVE after {attempts} attempts")]
    WaitTimeout {
        /// The state machine ARN.
        arn: String,
        /// Attempts made.
        attempts: u32,
    },

    /// One or more versions could not be purged.
    #[error("failed to delete {} version(s): {}", failures.len(), failures.join("; "))]
    Purge {
        /// One message per failed version.
        failures: Vec<String>,
    },

    /// Trigger targets were rejected by the remote service.
    #[error("{count} trigger target(s) failed to write")]
    TargetWrite {
        /// Number of failed entries.
        count: u32,
    },

    /// The execution ended in a failure state.
    #[error("execution {arn} ended with {status:?}: {error} ({cause})")]
    ExecutionFailed {
        /// The execution ARN.
        arn: String,
        /// Terminal status.
        status: ExecutionStatus,
        /// Error name reported by the service.
        error: String,
        /// Cause reported by the service.
        cause: String,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Addressing error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Local I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Wrap a remote error with the operation and resource it concerns.
    pub fn remote(op: &'static str, resource: impl Into<String>) -> impl FnOnce(RemoteError) -> Self {
        let resource = resource.into();
        move |source| Self::Remote {
            op,
            resource,
            source,
        }
    }

    /// Returns true if the error means the resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Remote { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if the error is an authorization failure.
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self, Self::Remote { source, .. } if source.is_access_denied())
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Remote { source, .. } if source.is_retriable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_looks_through_remote() {
        let err = DeployError::remote("describe", "orders")(RemoteError::NotFound("gone".into()));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "describe orders: not found: gone");

        let err = DeployError::NotFound {
            kind: "alias",
            name: "current".into(),
        };
        assert!(err.is_not_found());
        assert!(!DeployError::Cancelled.is_not_found());
    }

    #[test]
    fn access_denied_is_not_retriable() {
        let err = DeployError::remote("describe", "orders")(RemoteError::AccessDenied("no".into()));
        assert!(err.is_access_denied());
        assert!(!err.is_retriable());

        let err = DeployError::remote("describe", "orders")(RemoteError::Throttled("slow".into()));
        assert!(err.is_retriable());
    }

    #[test]
    fn purge_joins_failures() {
        let err = DeployError::Purge {
            failures: vec!["v1: boom".into(), "v3: bang".into()],
        };
        assert_eq!(
            err.to_string(),
            "failed to delete 2 version(s): v1: boom; v3: bang"
        );
    }
}
