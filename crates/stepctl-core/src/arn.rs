//! Qualified ARN addressing for state machines.
//!
//! An unqualified ARN identifies the state machine itself:
//!
//! ```text
//! arn:aws:states:<region>:<account>:stateMachine:<name>
//! ```
//!
//! Appending `:<alias-name>` or `:<version-number>` qualifies it. Version ARNs
//! are the only place version numbers are carried, so parsing the numeric
//! suffix is how a version number is recovered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// The alias that represents the deployed, serving version.
pub const CURRENT_ALIAS: &str = "current";

/// Number of `:`-separated segments in an unqualified state machine ARN.
const UNQUALIFIED_SEGMENTS: usize = 7;

/// A suffix addressing either an alias or a specific version.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Qualifier {
    /// A named alias such as `current`.
    Alias(String),
    /// A published version number.
    Version(u64),
}

impl Qualifier {
    /// Create an alias qualifier.
    #[must_use]
    pub fn alias(name: impl Into<String>) -> Self {
        Self::Alias(name.into())
    }

    /// The `current` alias qualifier.
    #[must_use]
    pub fn current() -> Self {
        Self::Alias(CURRENT_ALIAS.to_string())
    }
}

impl fmt::Debug for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(name) => write!(f, "Alias({name})"),
            Self::Version(n) => write!(f, "Version({n})"),
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(name) => f.write_str(name),
            Self::Version(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Qualifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.contains(':') {
            return Err(CoreError::InvalidQualifier(s.to_string()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(Self::Version)
                .map_err(|_| CoreError::InvalidQualifier(s.to_string()));
        }
        Ok(Self::Alias(s.to_string()))
    }
}

impl TryFrom<String> for Qualifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Qualifier> for String {
    fn from(q: Qualifier) -> Self {
        q.to_string()
    }
}

/// Append a qualifier to an unqualified ARN.
#[must_use]
pub fn qualify(arn: &str, qualifier: &Qualifier) -> String {
    format!("{}:{qualifier}", unqualify(arn))
}

/// Strip any alias or version suffix from a state machine ARN.
#[must_use]
pub fn unqualify(arn: &str) -> &str {
    match arn.match_indices(':').nth(UNQUALIFIED_SEGMENTS - 1) {
        Some((idx, _)) => &arn[..idx],
        None => arn,
    }
}

/// Return the qualifier suffix of an ARN, if it has one.
#[must_use]
pub fn qualifier_of(arn: &str) -> Option<&str> {
    let base = unqualify(arn);
    arn.get(base.len() + 1..).filter(|s| !s.is_empty())
}

/// Parse the version number from a version-qualified ARN.
///
/// # Errors
///
/// Returns `CoreError::InvalidVersionArn` if the suffix after the final `:`
/// is missing or not a number.
pub fn parse_version_number(version_arn: &str) -> Result<u64> {
    version_arn
        .rsplit_once(':')
        .and_then(|(_, suffix)| suffix.parse().ok())
        .ok_or_else(|| CoreError::InvalidVersionArn(version_arn.to_string()))
}

/// Return the resource name segment of a state machine ARN.
#[must_use]
pub fn resource_name(arn: &str) -> &str {
    unqualify(arn).rsplit(':').next().unwrap_or(arn)
}
