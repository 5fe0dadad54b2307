//! Chart registry error types.

use thiserror::Error;

/// Errors returned while listing chart versions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Chart '{chart}' not found in '{repository}'")]
    ChartNotFound { repository: String, chart: String },

    #[error("Unknown chart repository '{0}'")]
    UnknownRepository(String),

    #[error("Unsupported chart repository '{repository}': {reason}")]
    UnsupportedRepository { repository: String, reason: String },

    #[error("Fetching '{url}' failed with HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("Fetching '{url}' failed: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid repository index '{url}': {message}")]
    Parse { url: String, message: String },

    #[error("Version lookup cancelled")]
    Cancelled,
}

/// Result type for registry lookups.
pub type Result<T> = std::result::Result<T, RegistryError>;
