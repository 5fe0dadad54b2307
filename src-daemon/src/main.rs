mod error;
mod logging;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use valet::config::{load_config, resolve_config_path, LogConfig, ValetConfig};
use valet::releaser::ReleaserOptions;
use valet::{GitHubApp, HelmRepositoryRegistry, ScanScheduler, ScanService, ValetError};

use crate::error::Result;
use crate::server::AppState;

/// Keeps Helm chart versions in GitOps repositories up to date.
#[derive(Parser, Debug)]
#[command(name = "valetd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and the scan scheduler until Ctrl-C.
    Serve(ConfigArgs),
    /// Run one full scan, print its summary as JSON and exit.
    Scan(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file. Defaults to $VALET_CONFIG, then ./valet.yaml.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Command {
    fn config_args(&self) -> &ConfigArgs {
        match self {
            Command::Serve(args) | Command::Scan(args) => args,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let path = resolve_config_path(cli.command.config_args().config.as_deref());
    let config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            if logging::init(&LogConfig::default()).is_err() {
                eprintln!("Failed to load config from {}: {}", path.display(), e);
            } else {
                error!(path = %path.display(), error = %e, "Failed to load config");
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.log) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    info!(path = %path.display(), app_id = config.github.app_id, "Loaded config");

    let result = match cli.command {
        Command::Serve(_) => serve(config).await,
        Command::Scan(_) => scan_once(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "valetd failed");
            ExitCode::FAILURE
        }
    }
}

fn build_service(config: &ValetConfig) -> Result<ScanService> {
    let private_key = config.github.private_key().map_err(ValetError::from)?;
    let app = match &config.github.api_base_url {
        Some(url) => GitHubApp::with_base_url(url, config.github.app_id, private_key),
        None => GitHubApp::new(config.github.app_id, private_key),
    }
    .map_err(ValetError::from)?;

    let registry =
        HelmRepositoryRegistry::with_timeout(Duration::from_secs(config.registry.timeout_secs))
            .map_err(ValetError::from)?;

    let options = ReleaserOptions {
        config_path: config.github.release_config.clone(),
        branch_policy: config.scan.branch_policy,
    };

    Ok(ScanService::new(
        Arc::new(app),
        Arc::new(registry),
        options,
        config.scan.max_concurrent_repositories,
    ))
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}

async fn serve(config: ValetConfig) -> Result<()> {
    let service = Arc::new(build_service(&config)?);

    let (trigger_tx, trigger_rx) = broadcast::channel(16);
    let scheduler = ScanScheduler::new(
        Arc::clone(&service),
        Duration::from_secs(config.scan.interval_secs),
    );
    let scheduler_handle = scheduler.start(trigger_rx);

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let result = server::serve(
        config.rest.port,
        AppState::new(service, trigger_tx),
        shutdown.clone(),
    )
    .await;

    scheduler.stop();
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Scheduler task failed");
    }
    result
}

async fn scan_once(config: ValetConfig) -> Result<()> {
    let service = build_service(&config)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let summary = service.full_scan(&cancel).await.summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.failures.is_empty() {
        warn!(failures = summary.failures.len(), "Scan finished with failures");
    }
    Ok(())
}
