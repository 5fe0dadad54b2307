//! Per-repository reconciliation: rules, files, documents, publish.
//!
//! Failures are contained at the granularity where they happen. A document
//! that cannot be resolved is re-emitted unchanged, a file that cannot be
//! read or published does not stop the next file, and a rule whose branch is
//! missing does not stop the next rule.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::document::{parse_documents, render_documents, Node};
use crate::hosting::{Reference, Repository, SourceHost, TreeEntry};
use crate::registry::ChartRegistry;

use super::error::{DocumentError, ReleaserError};
use super::gate::{self, Automation};
use super::patcher::{self, ChartReference};
use super::publisher::{BranchPolicy, PublishRequest, Publisher};
use super::report::{
    ChartUpdate, DocumentOutcome, DocumentReport, FileOutcome, FileReport, RepositoryOutcome,
    RepositoryReport, RuleReport,
};
use super::resolver::{self, Resolution};
use super::rules::{self, Rule, RuleSet, DEFAULT_RELEASE_CONFIG_PATH};

/// Settings shared by every repository of a scan.
#[derive(Debug, Clone)]
pub struct ReleaserOptions {
    /// Path of the release config on the default branch.
    pub config_path: String,
    pub branch_policy: BranchPolicy,
}

impl Default for ReleaserOptions {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_RELEASE_CONFIG_PATH.to_string(),
            branch_policy: BranchPolicy::default(),
        }
    }
}

/// A repository with its rules loaded.
pub struct Releaser {
    host: Arc<dyn SourceHost>,
    registry: Arc<dyn ChartRegistry>,
    repository: Repository,
    rules: RuleSet,
    options: ReleaserOptions,
}

impl Releaser {
    /// Loads the release config of `repository` from its default branch.
    pub async fn new(
        host: Arc<dyn SourceHost>,
        registry: Arc<dyn ChartRegistry>,
        repository: Repository,
        options: ReleaserOptions,
        cancel: &CancellationToken,
    ) -> Result<Self, ReleaserError> {
        let rules =
            rules::fetch_rules(host.as_ref(), &repository, &options.config_path, cancel).await?;
        info!(
            rules = rules.rules.len(),
            rejected = rules.rejected.len(),
            "Loaded release config"
        );
        Ok(Self {
            host,
            registry,
            repository,
            rules,
            options,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Runs every rule in order.
    pub async fn scan_and_update(&self, cancel: &CancellationToken) -> Vec<RuleReport> {
        let mut reports = Vec::with_capacity(self.rules.rules.len());
        for rule in &self.rules.rules {
            if cancel.is_cancelled() {
                break;
            }
            let report = self.scan_rule(rule, cancel).await;
            if let Some(e) = &report.error {
                warn!(branch = %rule.branch, error = %e, "Failed to scan and update with rule");
            }
            reports.push(report);
        }
        reports
    }

    /// Scans the tree of `rule.branch` and updates every matching file.
    pub async fn scan_rule(&self, rule: &Rule, cancel: &CancellationToken) -> RuleReport {
        let mut report = RuleReport {
            branch: rule.branch.clone(),
            pattern: rule.files.as_str().to_string(),
            strategy: rule.strategy,
            files: Vec::new(),
            error: None,
        };

        let base = match self
            .host
            .get_ref(&self.repository.id, &rule.branch, cancel)
            .await
        {
            Ok(base) => base,
            Err(source) => {
                report.error = Some(ReleaserError::GetRef {
                    branch: rule.branch.clone(),
                    source,
                });
                return report;
            }
        };

        let tree = match self
            .host
            .get_tree(&self.repository.id, &base.sha, cancel)
            .await
        {
            Ok(tree) => tree,
            Err(source) => {
                report.error = Some(ReleaserError::GetTree {
                    branch: rule.branch.clone(),
                    source,
                });
                return report;
            }
        };

        for entry in rules::scan(&tree, rule) {
            if cancel.is_cancelled() {
                report.error = Some(ReleaserError::Cancelled);
                break;
            }
            info!(path = %entry.path, sha = %entry.sha, "Found matching file");
            let span = info_span!("file", path = %entry.path);
            let file = self.update_file(rule, &base, entry, cancel).instrument(span).await;
            if let FileOutcome::Failed(e) = &file.outcome {
                warn!(path = %entry.path, error = %e, "Failed to update file");
            }
            report.files.push(file);
        }

        report
    }

    /// Fetches, patches and, when anything changed, publishes one file.
    pub async fn update_file(
        &self,
        rule: &Rule,
        base: &Reference,
        entry: &TreeEntry,
        cancel: &CancellationToken,
    ) -> FileReport {
        let path = entry.path.as_str();

        let bytes = match self
            .host
            .get_blob(&self.repository.id, &entry.sha, cancel)
            .await
        {
            Ok(bytes) => bytes,
            Err(source) => {
                return FileReport::failed(
                    path,
                    ReleaserError::GetBlob {
                        path: path.to_string(),
                        source,
                    },
                )
            }
        };
        let Ok(text) = String::from_utf8(bytes) else {
            return FileReport::failed(
                path,
                ReleaserError::NotUtf8 {
                    path: path.to_string(),
                },
            );
        };
        let documents = match parse_documents(&text) {
            Ok(documents) => documents,
            Err(source) => {
                return FileReport::failed(
                    path,
                    ReleaserError::Parse {
                        path: path.to_string(),
                        source,
                    },
                )
            }
        };

        let mut output = Vec::with_capacity(documents.len());
        let mut reports = Vec::with_capacity(documents.len());
        for (index, document) in documents.iter().enumerate() {
            let (node, outcome) = self.update_document(document, cancel).await;
            match &outcome {
                DocumentOutcome::Failed(e) if e.is_cancelled() => {
                    return FileReport {
                        path: path.to_string(),
                        documents: reports,
                        outcome: FileOutcome::Failed(ReleaserError::Cancelled),
                    };
                }
                DocumentOutcome::Failed(e) => {
                    warn!(index, error = %e, "Failed to update document");
                }
                DocumentOutcome::Updated(update) => {
                    info!(index, chart = %update.chart, from = %update.from, to = %update.to, "Bumped chart version");
                }
                DocumentOutcome::NoNewVersion { chart } => {
                    debug!(index, chart = %chart, "No new chart version");
                }
                DocumentOutcome::NotAutomated => {
                    debug!(index, "Document is not automated");
                }
            }
            output.push(node);
            reports.push(DocumentReport { index, outcome });
        }

        let mut file = FileReport {
            path: path.to_string(),
            documents: reports,
            outcome: FileOutcome::Unchanged,
        };
        let updates: Vec<ChartUpdate> = file.updates().cloned().collect();
        if updates.is_empty() {
            return file;
        }

        let content = match render_documents(&output) {
            Ok(content) => content,
            Err(source) => {
                file.outcome = FileOutcome::Failed(ReleaserError::Render {
                    path: path.to_string(),
                    source,
                });
                return file;
            }
        };

        let publisher = Publisher::new(
            self.host.as_ref(),
            &self.repository.id,
            self.options.branch_policy,
        );
        let request = PublishRequest {
            path,
            blob_sha: &entry.sha,
            base,
            content,
            updates: &updates,
            strategy: rule.strategy,
        };
        file.outcome = match publisher.publish(request, cancel).await {
            Ok(result) => FileOutcome::Published(result),
            Err(e) => FileOutcome::Failed(e.into()),
        };
        file
    }

    /// Runs gate, resolver and patcher on one document.
    ///
    /// Always returns a node to emit: the patched one on success, the
    /// original otherwise.
    pub async fn update_document(
        &self,
        document: &Node,
        cancel: &CancellationToken,
    ) -> (Node, DocumentOutcome) {
        let automation = match gate::evaluate(document) {
            Ok(automation) => automation,
            Err(DocumentError::NotAutomated) => {
                return (document.clone(), DocumentOutcome::NotAutomated)
            }
            Err(e) => return (document.clone(), DocumentOutcome::Failed(e)),
        };

        let result = patcher::patch(document, |reference| {
            self.resolve(reference, automation, cancel)
        })
        .await;

        match result {
            Ok(patched) => match patched.update {
                Some(update) => (patched.document, DocumentOutcome::Updated(update)),
                None => (
                    patched.document,
                    DocumentOutcome::NoNewVersion {
                        chart: patched.chart,
                    },
                ),
            },
            Err(e) => (document.clone(), DocumentOutcome::Failed(e)),
        }
    }

    async fn resolve(
        &self,
        reference: ChartReference,
        automation: Automation,
        cancel: &CancellationToken,
    ) -> Result<Resolution, DocumentError> {
        let candidates = self
            .registry
            .list_versions(&reference.repository, &reference.name, cancel)
            .await
            .map_err(|source| DocumentError::Registry {
                chart: reference.name.clone(),
                source,
            })?;
        debug!(
            chart = %reference.name,
            current = %reference.current_version,
            constraint = %automation.constraint,
            candidates = candidates.len(),
            "Resolving chart version"
        );
        Ok(resolver::resolve(
            &reference.current_version,
            &candidates,
            &automation.constraint,
        ))
    }
}

/// Reconciles one repository. Never fails: every outcome is in the report.
pub async fn scan_and_update(
    host: Arc<dyn SourceHost>,
    registry: Arc<dyn ChartRegistry>,
    repository: Repository,
    options: ReleaserOptions,
    cancel: CancellationToken,
) -> RepositoryReport {
    let span = info_span!("repository", repository = %repository.id);
    async move {
        let id = repository.id.clone();
        let releaser = match Releaser::new(host, registry, repository, options, &cancel).await {
            Ok(releaser) => releaser,
            Err(ReleaserError::FileMissing { path }) => {
                debug!(path = %path, "No release config, skipping repository");
                return RepositoryReport::new(id, RepositoryOutcome::Skipped);
            }
            Err(e) if e.is_cancelled() => {
                return RepositoryReport::new(id, RepositoryOutcome::Cancelled);
            }
            Err(e) => {
                warn!(error = %e, "Failed to load release config");
                return RepositoryReport::new(id, RepositoryOutcome::Failed(e));
            }
        };

        let rules = releaser.scan_and_update(&cancel).await;
        let outcome = if cancel.is_cancelled() {
            RepositoryOutcome::Cancelled
        } else {
            RepositoryOutcome::Scanned
        };
        RepositoryReport {
            repository: id,
            rejected_rules: releaser.rules().rejected.clone(),
            rules,
            outcome,
        }
    }
    .instrument(span)
    .await
}
