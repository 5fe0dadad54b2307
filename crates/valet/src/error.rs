use std::path::PathBuf;
use thiserror::Error;

use crate::document::YamlError;
use crate::hosting::HostError;
use crate::registry::RegistryError;
use crate::releaser::{ConstraintError, DocumentError, PublishError, ReleaserError, RuleError};
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum ValetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("YAML error: {0}")]
    Yaml(#[from] YamlError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Constraint error: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("Hosting error: {0}")]
    Host(#[from] HostError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Releaser error: {0}")]
    Releaser(#[from] ReleaserError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value '{value}' in environment variable {name}")]
    InvalidOverride { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ValetError>;
