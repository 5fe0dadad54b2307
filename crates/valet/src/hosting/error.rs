//! Hosting API error types.

use thiserror::Error;

/// Errors returned by source-hosting operations.
///
/// Every variant names the operation that failed so callers can log it
/// without extra context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("{operation}: {resource} not found")]
    NotFound {
        operation: &'static str,
        resource: String,
    },

    #[error("{operation} failed with HTTP {status}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} returned an unexpected response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },
}

impl HostError {
    /// True for 404-style responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound { .. })
    }

    /// True when the call was aborted by its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HostError::Cancelled { .. })
    }

    /// True for conflicts such as an already existing ref or a stale blob sha.
    pub fn is_conflict(&self) -> bool {
        matches!(self, HostError::Api { status: 409 | 422, .. })
    }
}

/// Result type for hosting operations.
pub type Result<T> = std::result::Result<T, HostError>;
