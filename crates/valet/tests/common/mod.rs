//! Shared setup for the reconciliation integration tests.
//!
//! `RepoHarness` wires one in-memory repository to a static chart index and
//! runs `scan_and_update` against it.

#![allow(dead_code)]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use valet::hosting::{MemoryHost, Repository, RepositoryId};
use valet::registry::StaticIndexRegistry;
use valet::releaser::{
    scan_and_update, BranchPolicy, ReleaserOptions, RepositoryReport, DEFAULT_RELEASE_CONFIG_PATH,
};

pub const CHARTS: &str = "https://charts.example.com";

/// A HelmRelease manifest in the canonical form the renderer emits.
pub fn helm_release(name: &str, version: &str) -> String {
    HelmReleaseBuilder::new(name, version).build()
}

/// Builder for HelmRelease manifests.
pub struct HelmReleaseBuilder {
    name: String,
    version: String,
    automated: Option<String>,
    filter: Option<String>,
}

impl HelmReleaseBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            automated: Some("'true'".to_string()),
            filter: None,
        }
    }

    pub fn manual(mut self) -> Self {
        self.automated = None;
        self
    }

    pub fn filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    pub fn build(self) -> String {
        let mut annotations = String::new();
        if let Some(automated) = &self.automated {
            annotations.push_str(&format!("    valet.io/automated: {}\n", automated));
        }
        if let Some(filter) = &self.filter {
            annotations.push_str(&format!("    filter.valet.io/chart: {}\n", filter));
        }
        let metadata = if annotations.is_empty() {
            format!("metadata:\n  name: {}\n", self.name)
        } else {
            format!("metadata:\n  name: {}\n  annotations:\n{}", self.name, annotations)
        };
        format!(
            "apiVersion: helm.toolkit.fluxcd.io/v2\nkind: HelmRelease\n{metadata}spec:\n  chart:\n    name: {name}\n    repository: {CHARTS}\n    version: {version}\n",
            name = self.name,
            version = self.version,
        )
    }
}

pub struct RepoHarness {
    pub host: Arc<MemoryHost>,
    pub repository: Repository,
    pub registry: StaticIndexRegistry,
    pub options: ReleaserOptions,
}

impl RepoHarness {
    /// An `acme/deploy` repository with `main` as default branch and no files.
    pub fn new() -> Self {
        let host = Arc::new(MemoryHost::new());
        let id = host.add_repository("acme", "deploy", "main");
        Self {
            host,
            repository: Repository {
                id,
                default_branch: "main".to_string(),
            },
            registry: StaticIndexRegistry::new(),
            options: ReleaserOptions::default(),
        }
    }

    pub fn id(&self) -> &RepositoryId {
        &self.repository.id
    }

    pub fn with_release_config(self, config: &str) -> Self {
        self.host
            .put_file(&self.repository.id, "main", DEFAULT_RELEASE_CONFIG_PATH, config);
        self
    }

    pub fn with_file(self, branch: &str, path: &str, content: &str) -> Self {
        self.host.put_file(&self.repository.id, branch, path, content);
        self
    }

    pub fn with_chart(mut self, chart: &str, versions: &[&str]) -> Self {
        self.registry = self.registry.with_chart(CHARTS, chart, versions);
        self
    }

    pub fn with_branch_policy(mut self, policy: BranchPolicy) -> Self {
        self.options.branch_policy = policy;
        self
    }

    pub async fn run(&self) -> RepositoryReport {
        self.run_with(CancellationToken::new()).await
    }

    pub async fn run_with(&self, cancel: CancellationToken) -> RepositoryReport {
        scan_and_update(
            self.host.clone(),
            Arc::new(self.registry.clone()),
            self.repository.clone(),
            self.options.clone(),
            cancel,
        )
        .await
    }

    pub fn content(&self, branch: &str, path: &str) -> Option<String> {
        self.host.file_content(&self.repository.id, branch, path)
    }
}
