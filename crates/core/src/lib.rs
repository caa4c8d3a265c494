//! Shared primitives for all Rust crates in the datatag coordination substrate.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across datatag crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
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

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Lock lease shorter than the one second minimum.
    #[error("lock ttl must be at least one second, got {0} ms")]
    ShortTtl(u128),

    /// Key/value backend fault (network, protocol, server error).
    #[error("backend error: {0}")]
    Backend(String),

    /// Backend answered with a reply the caller cannot interpret.
    #[error("unexpected backend response: {0}")]
    UnexpectedResponse(String),

    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller's scope was cancelled while the operation was waiting.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl AppError {
    /// Returns whether this error reports a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns whether this error originates in the key/value backend.
    ///
    /// Unexpected script replies count as backend faults.
    #[must_use]
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::UnexpectedResponse(_))
    }
}
