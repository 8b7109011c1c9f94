//! Error types for remote control-plane calls.

use thiserror::Error;

/// Errors returned by remote control-plane operations.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The addressed resource, alias, version, rule or schedule does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current remote state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is not permitted to perform the operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The service is throttling requests.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Any other error reported by the service.
    #[error("service error {code} (HTTP {status}): {message}")]
    Api {
        /// Error code reported by the service (`__type` without namespace).
        code: String,
        /// Human-readable message.
        message: String,
        /// HTTP status of the response.
        status: u16,
    },

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Throttled(_) | Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error means the resource is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error is a terminal permission failure.
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }

    /// Classify a service error code into the error taxonomy.
    #[must_use]
    pub fn from_code(code: &str, message: impl Into<String>, status: u16) -> Self {
        let message = message.into();
        if code.ends_with("DoesNotExist") || code.starts_with("ResourceNotFound") {
            Self::NotFound(message)
        } else if code.starts_with("Conflict") {
            Self::Conflict(message)
        } else if code.starts_with("AccessDenied") {
            Self::AccessDenied(message)
        } else if code.starts_with("Throttling") || code == "TooManyRequestsException" {
            Self::Throttled(message)
        } else {
            Self::Api {
                code: code.to_string(),
                message,
                status,
            }
        }
    }
}

/// A specialized Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_codes() {
        assert!(RemoteError::from_code("StateMachineDoesNotExist", "x", 400).is_not_found());
        assert!(RemoteError::from_code("ResourceNotFoundException", "x", 400).is_not_found());
        assert!(matches!(
            RemoteError::from_code("ConflictException", "x", 400),
            RemoteError::Conflict(_)
        ));
        assert!(RemoteError::from_code("AccessDeniedException", "x", 400).is_access_denied());
        assert!(RemoteError::from_code("ThrottlingException", "x", 400).is_retriable());
        assert!(matches!(
            RemoteError::from_code("ValidationException", "x", 400),
            RemoteError::Api { .. }
        ));
    }

    #[test]
    fn retriable_errors() {
        assert!(RemoteError::Throttled("slow down".into()).is_retriable());
        assert!(RemoteError::Api {
            code: "InternalFailure".into(),
            message: String::new(),
            status: 500
        }
        .is_retriable());
        assert!(!RemoteError::AccessDenied("no".into()).is_retriable());
        assert!(!RemoteError::Conflict("busy".into()).is_retriable());
    }
}
