//! Shared primitives for all Rust crates in Warden.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::ActorIdentity;

/// Result type used across Warden crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
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

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested entity does not exist or is already soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with concurrently committed state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Governance rejected the mutation. The first field is the stable reason code.
    #[error("forbidden ({0}): {1}")]
    Forbidden(String, String),

    /// Underlying persistence is unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A structural invariant would be broken; never expected in normal operation.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the caller may safely re-issue the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }

    /// Returns the governance reason code for forbidden errors.
    #[must_use]
    pub fn reason_code(&self) -> Option<&str> {
        match self {
            Self::Forbidden(code, _) => Some(code.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_string_trims_value() {
        let value = NonEmptyString::new("  manager ");
        assert_eq!(
            value.map(String::from).unwrap_or_default(),
            "manager".to_owned()
        );
    }

    #[test]
    fn only_conflict_and_unavailable_are_retryable() {
        assert!(AppError::Conflict("race".to_owned()).is_retryable());
        assert!(AppError::Unavailable("down".to_owned()).is_retryable());
        assert!(!AppError::NotFound("role".to_owned()).is_retryable());
        assert!(
            !AppError::Forbidden("protected_role".to_owned(), "root".to_owned()).is_retryable()
        );
    }

    #[test]
    fn forbidden_exposes_reason_code() {
        let error = AppError::Forbidden("protected_role".to_owned(), "denied".to_owned());
        assert_eq!(error.reason_code(), Some("protected_role"));
        assert_eq!(AppError::Internal("x".to_owned()).reason_code(), None);
    }
}
