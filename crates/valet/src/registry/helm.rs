//! HTTP Helm repository client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{RegistryError, Result};
use super::index::IndexFile;
use super::ChartRegistry;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time budget for one index download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads `<repository>/index.yaml` from classic HTTP chart repositories.
///
/// The index is fetched fresh on every lookup.
pub struct HelmRepositoryRegistry {
    client: Client,
}

impl HelmRepositoryRegistry {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Transport {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    async fn fetch_index(&self, url: &str) -> Result<IndexFile> {
        debug!(url, "Fetching chart repository index");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| RegistryError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        IndexFile::parse(&text).map_err(|e| RegistryError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// URL of the index file for `repository`.
pub fn index_url(repository: &str) -> Result<String> {
    let repository = repository.trim();
    if repository.starts_with("oci://") {
        return Err(RegistryError::UnsupportedRepository {
            repository: repository.to_string(),
            reason: "OCI registries are not supported".to_string(),
        });
    }
    if !(repository.starts_with("https://") || repository.starts_with("http://")) {
        return Err(RegistryError::UnsupportedRepository {
            repository: repository.to_string(),
            reason: "expected an http(s) URL".to_string(),
        });
    }
    Ok(format!("{}/index.yaml", repository.trim_end_matches('/')))
}

#[async_trait]
impl ChartRegistry for HelmRepositoryRegistry {
    async fn list_versions(
        &self,
        repository: &str,
        chart: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let url = index_url(repository)?;
        let index = cancel
            .run_until_cancelled(self.fetch_index(&url))
            .await
            .ok_or(RegistryError::Cancelled)??;
        index
            .versions(chart)
            .ok_or_else(|| RegistryError::ChartNotFound {
                repository: repository.to_string(),
                chart: chart.to_string(),
            })
    }
}
