//! Full scans across every installation and repository.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::hosting::{HostError, Installation, InstallationProvider};
use crate::registry::ChartRegistry;
use crate::releaser::{
    scan_and_update, InstallationFailure, ReleaserOptions, RepositoryOutcome, RepositoryReport,
    ScanReport,
};

/// Default number of repositories reconciled at the same time.
pub const DEFAULT_MAX_CONCURRENT_REPOSITORIES: usize = 4;

/// Runs full scans and keeps the last report.
pub struct ScanService {
    installations: Arc<dyn InstallationProvider>,
    registry: Arc<dyn ChartRegistry>,
    options: ReleaserOptions,
    max_concurrent_repositories: usize,
    last_report: RwLock<Option<ScanReport>>,
    /// Serializes scans.
    scan_lock: Mutex<()>,
}

impl ScanService {
    pub fn new(
        installations: Arc<dyn InstallationProvider>,
        registry: Arc<dyn ChartRegistry>,
        options: ReleaserOptions,
        max_concurrent_repositories: usize,
    ) -> Self {
        Self {
            installations,
            registry,
            options,
            max_concurrent_repositories: max_concurrent_repositories.max(1),
            last_report: RwLock::new(None),
            scan_lock: Mutex::new(()),
        }
    }

    pub async fn list_installations(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Installation>, HostError> {
        self.installations.list_installations(cancel).await
    }

    /// The report of the last completed scan.
    pub async fn last_report(&self) -> Option<ScanReport> {
        self.last_report.read().await.clone()
    }

    /// Returns true while a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scan_lock.try_lock().is_err()
    }

    /// Reconciles every repository of every installation.
    ///
    /// Repositories run on a bounded pool. An installation that cannot be
    /// listed or connected is recorded and skipped; one repository's failure
    /// never affects another.
    pub async fn full_scan(&self, cancel: &CancellationToken) -> ScanReport {
        let _guard = self.scan_lock.lock().await;
        let started_at = Utc::now();
        info!("Starting full scan");

        let mut installation_failures = Vec::new();
        let installations = match self.installations.list_installations(cancel).await {
            Ok(installations) => installations,
            Err(e) => {
                warn!(error = %e, "Failed to list installations");
                installation_failures.push(InstallationFailure {
                    installation: 0,
                    account: String::new(),
                    message: e.to_string(),
                });
                Vec::new()
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_repositories));
        let mut tasks = JoinSet::new();

        for installation in installations {
            if cancel.is_cancelled() {
                break;
            }

            let host = match self.installations.connect(&installation, cancel).await {
                Ok(host) => host,
                Err(e) => {
                    warn!(installation = installation.id, account = %installation.account, error = %e, "Failed to connect to installation");
                    installation_failures.push(failure(&installation, &e));
                    continue;
                }
            };
            let repositories = match host.list_repositories(cancel).await {
                Ok(repositories) => repositories,
                Err(e) => {
                    warn!(installation = installation.id, account = %installation.account, error = %e, "Failed to list repositories");
                    installation_failures.push(failure(&installation, &e));
                    continue;
                }
            };
            info!(
                installation = installation.id,
                account = %installation.account,
                repositories = repositories.len(),
                "Scanning installation"
            );

            for repository in repositories {
                let semaphore = Arc::clone(&semaphore);
                let host = Arc::clone(&host);
                let registry = Arc::clone(&self.registry);
                let options = self.options.clone();
                let cancel = cancel.clone();
                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return RepositoryReport::new(repository.id, RepositoryOutcome::Cancelled);
                    };
                    scan_and_update(host, registry, repository, options, cancel).await
                });
            }
        }

        let mut repositories = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(report) => repositories.push(report),
                Err(e) => error!(error = %e, "Repository scan task panicked"),
            }
        }
        repositories.sort_by(|a, b| a.repository.cmp(&b.repository));

        let report = ScanReport {
            started_at,
            finished_at: Utc::now(),
            installation_failures,
            repositories,
            cancelled: cancel.is_cancelled(),
        };
        let summary = report.summary();
        info!(
            repositories = summary.repositories,
            files_published = summary.files_published,
            failures = summary.failures.len(),
            cancelled = summary.cancelled,
            "Full scan finished"
        );

        *self.last_report.write().await = Some(report.clone());
        report
    }
}

fn failure(installation: &Installation, error: &HostError) -> InstallationFailure {
    InstallationFailure {
        installation: installation.id,
        account: installation.account.clone(),
        message: error.to_string(),
    }
}
