//! YAML document error types.

use thiserror::Error;

/// Errors raised while reading, editing or rendering YAML documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum YamlError {
    #[error("Failed to parse YAML document {index}: {message}")]
    Parse { index: usize, message: String },

    #[error("Failed to serialize YAML: {0}")]
    Serialize(String),

    #[error("Unsupported mapping key: {0}")]
    UnsupportedKey(String),

    #[error("Path segment '{segment}' does not address a mapping")]
    NotAMap { segment: String },
}

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, YamlError>;
