use std::path::{Path, PathBuf};

use crate::config::schema::{LogFormat, ValetConfig};
use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "VALET_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "valet.yaml";

pub const LOG_LEVEL_ENV_VAR: &str = "VALET_LOG_LEVEL";
pub const LOG_FORMAT_ENV_VAR: &str = "VALET_LOG_FORMAT";
pub const REST_PORT_ENV_VAR: &str = "VALET_REST_PORT";
pub const GITHUB_APP_ID_ENV_VAR: &str = "VALET_GITHUB_APP_ID";

/// Picks the config file: the explicit path, then `VALET_CONFIG`, then
/// `./valet.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ValetConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses the config, applies environment overrides and validates it.
pub fn load_config_from_str(content: &str) -> Result<ValetConfig, ConfigError> {
    let mut config: ValetConfig = serde_yaml::from_str(content)?;

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

pub fn apply_env_overrides(config: &mut ValetConfig) -> Result<(), ConfigError> {
    if let Some(level) = env_override(LOG_LEVEL_ENV_VAR) {
        config.log.level = level;
    }
    if let Some(format) = env_override(LOG_FORMAT_ENV_VAR) {
        config.log.format = LogFormat::parse(&format);
    }
    if let Some(port) = env_override(REST_PORT_ENV_VAR) {
        config.rest.port = port.parse().map_err(|_| ConfigError::InvalidOverride {
            name: REST_PORT_ENV_VAR,
            value: port.clone(),
        })?;
    }
    if let Some(app_id) = env_override(GITHUB_APP_ID_ENV_VAR) {
        config.github.app_id = app_id.parse().map_err(|_| ConfigError::InvalidOverride {
            name: GITHUB_APP_ID_ENV_VAR,
            value: app_id.clone(),
        })?;
    }
    Ok(())
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_config(config: &ValetConfig) -> Result<(), ConfigError> {
    if config.github.app_id == 0 {
        return Err(ConfigError::Validation {
            message: "github.appId must be set".to_string(),
        });
    }

    if !config.github.has_private_key() {
        return Err(ConfigError::Validation {
            message: "github needs one of privateKeyPem, privateKeyFile or privateKeyEnvVar"
                .to_string(),
        });
    }

    if config.github.release_config.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "github.releaseConfig must not be empty".to_string(),
        });
    }

    if config.scan.max_concurrent_repositories == 0 {
        return Err(ConfigError::Validation {
            message: "scan.maxConcurrentRepositories must be greater than zero".to_string(),
        });
    }

    if config.scan.interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "scan.intervalSecs must be greater than zero".to_string(),
        });
    }

    if config.registry.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "registry.timeoutSecs must be greater than zero".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::releaser::BranchPolicy;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = "github:\n  appId: 42\n  privateKeyFile: /run/secrets/valet.pem\n";

    fn clear_env() {
        for name in [
            CONFIG_ENV_VAR,
            LOG_LEVEL_ENV_VAR,
            LOG_FORMAT_ENV_VAR,
            REST_PORT_ENV_VAR,
            GITHUB_APP_ID_ENV_VAR,
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.github.app_id, 42);
        assert_eq!(config.github.release_config, ".github/valet.yaml");
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Text);
        assert_eq!(config.rest.port, 8080);
        assert_eq!(config.registry.timeout_secs, 30);
        assert_eq!(config.scan.interval_secs, 300);
        assert_eq!(config.scan.max_concurrent_repositories, 4);
        assert_eq!(config.scan.branch_policy, BranchPolicy::Fail);
    }

    #[test]
    #[serial]
    fn test_full_config() {
        clear_env();
        let config = load_config_from_str(
            r#"
log:
  level: debug
  format: json
rest:
  port: 9000
github:
  appId: 7
  privateKeyEnvVar: VALET_KEY
  releaseConfig: .valet/rules.yaml
  apiBaseUrl: https://ghe.example.com/api/v3
registry:
  timeoutSecs: 5
scan:
  intervalSecs: 60
  maxConcurrentRepositories: 8
  branchPolicy: reset
"#,
        )
        .unwrap();
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.rest.port, 9000);
        assert_eq!(config.github.private_key_env_var.as_deref(), Some("VALET_KEY"));
        assert_eq!(
            config.github.api_base_url.as_deref(),
            Some("https://ghe.example.com/api/v3")
        );
        assert_eq!(config.scan.branch_policy, BranchPolicy::Reset);
        assert_eq!(config.scan.max_concurrent_repositories, 8);
    }

    #[test]
    #[serial]
    fn test_unknown_log_format_is_kept() {
        clear_env();
        let config =
            load_config_from_str(&format!("log:\n  format: xml\n{}", MINIMAL)).unwrap();
        assert_eq!(config.log.format, LogFormat::Other("xml".to_string()));
    }

    #[test]
    #[serial]
    fn test_validation_failures() {
        clear_env();
        let cases = [
            ("github:\n  privateKeyFile: k.pem\n", "appId"),
            ("github:\n  appId: 1\n", "privateKeyPem"),
            (
                "github:\n  appId: 1\n  privateKeyPem: x\nscan:\n  maxConcurrentRepositories: 0\n",
                "maxConcurrentRepositories",
            ),
            (
                "github:\n  appId: 1\n  privateKeyPem: x\nscan:\n  intervalSecs: 0\n",
                "intervalSecs",
            ),
        ];
        for (content, expected) in cases {
            let err = load_config_from_str(content).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "expected '{}' in '{}'",
                expected,
                err
            );
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var(LOG_LEVEL_ENV_VAR, "trace");
        std::env::set_var(LOG_FORMAT_ENV_VAR, "JSON");
        std::env::set_var(REST_PORT_ENV_VAR, "3000");
        std::env::set_var(GITHUB_APP_ID_ENV_VAR, "99");

        let config = load_config_from_str(MINIMAL).unwrap();
        clear_env();

        assert_eq!(config.log.level, "trace");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.rest.port, 3000);
        assert_eq!(config.github.app_id, 99);
    }

    #[test]
    #[serial]
    fn test_env_override_supplies_app_id() {
        clear_env();
        std::env::set_var(GITHUB_APP_ID_ENV_VAR, "5");
        let result = load_config_from_str("github:\n  privateKeyPem: x\n");
        clear_env();
        assert_eq!(result.unwrap().github.app_id, 5);
    }

    #[test]
    #[serial]
    fn test_invalid_override() {
        clear_env();
        std::env::set_var(REST_PORT_ENV_VAR, "not-a-port");
        let result = load_config_from_str(MINIMAL);
        clear_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOverride {
                name: REST_PORT_ENV_VAR,
                ..
            })
        ));
    }

    #[test]
    #[serial]
    fn test_load_config_from_file() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", MINIMAL).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.github.app_id, 42);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/valet.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path() {
        clear_env();
        assert_eq!(resolve_config_path(None), PathBuf::from("valet.yaml"));

        std::env::set_var(CONFIG_ENV_VAR, "/etc/valet/valet.yaml");
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("/etc/valet/valet.yaml")
        );
        assert_eq!(
            resolve_config_path(Some(Path::new("local.yaml"))),
            PathBuf::from("local.yaml")
        );
        clear_env();
    }
}
