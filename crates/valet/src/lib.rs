pub mod config;
pub mod document;
pub mod error;
pub mod hosting;
pub mod registry;
pub mod releaser;
pub mod scheduler;
pub mod secrets;
pub mod service;

pub use config::{load_config, ValetConfig};
pub use error::{ConfigError, Result, ValetError};
pub use hosting::{GitHubApp, HostError, InstallationProvider, SourceHost};
pub use registry::{ChartRegistry, HelmRepositoryRegistry, RegistryError, StaticIndexRegistry};
pub use releaser::{scan_and_update, Releaser, ReleaserOptions, ScanReport, ScanSummary};
pub use scheduler::ScanScheduler;
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use service::ScanService;
