//! Registry backed by in-memory index files.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::{RegistryError, Result};
use super::index::IndexFile;
use super::ChartRegistry;

/// Serves chart versions from indexes held in memory.
///
/// Indexes are keyed by repository URL. A fallback index, when set, answers
/// for every repository without its own entry.
#[derive(Debug, Clone, Default)]
pub struct StaticIndexRegistry {
    indexes: HashMap<String, IndexFile>,
    fallback: Option<IndexFile>,
}

impl StaticIndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that answers every repository from `index`.
    pub fn from_index(index: IndexFile) -> Self {
        Self {
            indexes: HashMap::new(),
            fallback: Some(index),
        }
    }

    /// Parses a YAML index and serves it for every repository.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let index = IndexFile::parse(text).map_err(|e| RegistryError::Parse {
            url: "<static>".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_index(index))
    }

    pub fn insert(&mut self, repository: &str, index: IndexFile) {
        self.indexes
            .insert(repository.trim_end_matches('/').to_string(), index);
    }

    /// Adds `versions` of `chart` to the index of `repository`.
    pub fn with_chart(mut self, repository: &str, chart: &str, versions: &[&str]) -> Self {
        let index = self
            .indexes
            .entry(repository.trim_end_matches('/').to_string())
            .or_default();
        for version in versions {
            index.push(chart, version);
        }
        self
    }
}

#[async_trait]
impl ChartRegistry for StaticIndexRegistry {
    async fn list_versions(
        &self,
        repository: &str,
        chart: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }
        let index = self
            .indexes
            .get(repository.trim_end_matches('/'))
            .or(self.fallback.as_ref())
            .ok_or_else(|| RegistryError::UnknownRepository(repository.to_string()))?;
        index
            .versions(chart)
            .ok_or_else(|| RegistryError::ChartNotFound {
                repository: repository.to_string(),
                chart: chart.to_string(),
            })
    }
}
