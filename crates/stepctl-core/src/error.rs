//! Common error types for stepctl.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing addresses and conventions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The ARN does not end in a numeric version suffix.
    #[error("invalid version ARN: {0}")]
    InvalidVersionArn(String),

    /// The qualifier is empty or contains a separator.
    #[error("invalid qualifier: {0:?}")]
    InvalidQualifier(String),
}
