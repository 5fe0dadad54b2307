use serde::{Deserialize, Serialize};

use crate::releaser::{BranchPolicy, DEFAULT_RELEASE_CONFIG_PATH};

/// Daemon configuration, read from `valet.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValetConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub rest: RestConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
    /// Anything else; logged and treated as text.
    #[serde(untagged)]
    Other(String),
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "json" => Self::Json,
            _ => Self::Other(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestConfig {
    #[serde(default = "default_rest_port")]
    pub port: u16,
}

fn default_rest_port() -> u16 {
    8080
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            port: default_rest_port(),
        }
    }
}

/// GitHub App credentials. The private key comes from exactly one of the
/// three sources, in the order the secrets module resolves them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubConfig {
    #[serde(default)]
    pub app_id: u64,
    #[serde(default, skip_serializing)]
    pub private_key_pem: Option<String>,
    #[serde(default)]
    pub private_key_file: Option<String>,
    #[serde(default)]
    pub private_key_env_var: Option<String>,
    #[serde(default = "default_release_config")]
    pub release_config: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_release_config() -> String {
    DEFAULT_RELEASE_CONFIG_PATH.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
}

fn default_registry_timeout() -> u64 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_registry_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_repositories: usize,
    #[serde(default)]
    pub branch_policy: BranchPolicy,
}

fn default_interval() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    crate::service::DEFAULT_MAX_CONCURRENT_REPOSITORIES
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_concurrent_repositories: default_max_concurrent(),
            branch_policy: BranchPolicy::default(),
        }
    }
}

impl GitHubConfig {
    pub fn has_private_key(&self) -> bool {
        crate::secrets::has_secret_source(
            self.private_key_pem.as_deref(),
            self.private_key_file.as_deref(),
            self.private_key_env_var.as_deref(),
        )
    }

    /// Resolves the PEM-encoded private key.
    pub fn private_key(&self) -> Result<secrecy::SecretString, crate::secrets::SecretError> {
        crate::secrets::resolve_pem(
            self.private_key_pem.as_deref(),
            self.private_key_file.as_deref(),
            self.private_key_env_var.as_deref(),
        )
    }
}
