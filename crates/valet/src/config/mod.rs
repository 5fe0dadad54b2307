pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, load_config, load_config_from_str, resolve_config_path, validate_config,
};
pub use schema::{
    GitHubConfig, LogConfig, LogFormat, RegistryConfig, RestConfig, ScanConfig, ValetConfig,
};
