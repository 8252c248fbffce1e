//! Shared primitives for all Rust crates in Warden.

#![forbid(unsafe_code)]

/// Acting principal and scope primitives shared across services.
pub mod auth;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::{Actor, Scope, ScopeId, UserId};

/// Result type used across Warden crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string. Surrounding whitespace is trimmed.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Machine-readable error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; never retried.
    Validation,
    /// Referenced role, user or assignment does not exist.
    NotFound,
    /// Invariant violation requiring a caller decision.
    Conflict,
    /// Caller lacks the privilege required for the operation.
    Forbidden,
    /// Opaque infrastructure failure.
    Internal,
}

impl ErrorKind {
    /// Returns a stable code for this error kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Internal => "internal",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the machine-readable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the detail message without the kind prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(detail)
            | Self::NotFound(detail)
            | Self::Conflict(detail)
            | Self::Forbidden(detail)
            | Self::Internal(detail) => detail.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ErrorKind, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_string_trims_input() {
        let value = NonEmptyString::new("  org-1 ").map(String::from);
        assert_eq!(value.ok().as_deref(), Some("org-1"));
    }

    #[test]
    fn error_kind_codes_are_stable() {
        let error = AppError::Conflict("role 'owner' is a system role".to_owned());
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert_eq!(error.kind().as_str(), "conflict");
        assert_eq!(error.detail(), "role 'owner' is a system role");
    }

    #[test]
    fn error_kind_serializes_as_snake_case() {
        let encoded = serde_json::to_string(&ErrorKind::NotFound).unwrap_or_default();
        assert_eq!(encoded, "\"not_found\"");
    }
}
