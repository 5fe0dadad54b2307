//! Log subscriber setup.
//!
//! The level from the config is the default directive; `RUST_LOG` refines or
//! overrides it. Records emitted through the `log` facade are bridged into
//! tracing.

use std::str::FromStr;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};
use valet::config::{LogConfig, LogFormat};

use crate::error::{DaemonError, Result};

/// Level and format actually used, plus anything that had to fall back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub json: bool,
    pub warnings: Vec<String>,
}

impl LogSettings {
    pub fn from_config(config: &LogConfig) -> Self {
        let mut warnings = Vec::new();

        let level = LevelFilter::from_str(config.level.trim()).unwrap_or_else(|_| {
            warnings.push(format!(
                "Unknown log level '{}', falling back to info",
                config.level
            ));
            LevelFilter::INFO
        });

        let json = match &config.format {
            LogFormat::Text => false,
            LogFormat::Json => true,
            LogFormat::Other(format) => {
                warnings.push(format!(
                    "Unknown log format '{}', falling back to text",
                    format
                ));
                false
            }
        };

        Self {
            level,
            json,
            warnings,
        }
    }
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init(config: &LogConfig) -> Result<()> {
    let settings = LogSettings::from_config(config);

    tracing_log::LogTracer::init().map_err(|e| DaemonError::Logging(e.to_string()))?;

    let filter = EnvFilter::builder()
        .with_default_directive(settings.level.into())
        .from_env_lossy();

    let (text, json) = if settings.json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| DaemonError::Logging(e.to_string()))?;

    for warning in &settings.warnings {
        tracing::warn!("{}", warning);
    }
    Ok(())
}
