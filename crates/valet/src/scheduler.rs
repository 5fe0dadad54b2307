//! Periodic full-scan scheduler.
//!
//! Runs a scan every interval and whenever a manual trigger arrives on the
//! broadcast channel. Stopping cancels the scan in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::service::ScanService;

/// Periodic scan scheduler.
pub struct ScanScheduler {
    service: Arc<ScanService>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ScanScheduler {
    pub fn new(service: Arc<ScanService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts the scan loop on the current runtime.
    ///
    /// The first scan runs immediately.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let shutdown = self.shutdown.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval_timer.tick() => {},
                    trigger = trigger_rx.recv() => match trigger {
                        Ok(()) => log::info!("Manual scan triggered"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::debug!("Coalesced {} scan triggers", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            log::info!("Scan trigger channel closed, stopping scheduler");
                            break;
                        }
                    },
                }

                let report = service.full_scan(&shutdown.child_token()).await;
                let summary = report.summary();
                if summary.failures.is_empty() {
                    log::info!(
                        "Scan finished: {} repositories, {} files published",
                        summary.repositories,
                        summary.files_published
                    );
                } else {
                    log::warn!(
                        "Scan finished with {} failures: {} repositories, {} files published",
                        summary.failures.len(),
                        summary.repositories,
                        summary.files_published
                    );
                }
                if report.cancelled {
                    break;
                }
            }
            log::info!("Scan scheduler stopped");
        })
    }

    /// Signals the scheduler to stop and cancels the running scan.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}
