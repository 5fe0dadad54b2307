//! Structured results of a scan, from single documents up to a full run.
//!
//! Every stage returns one of these values instead of only logging, so the
//! caller decides what to log and what to expose over HTTP.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::hosting::RepositoryId;

use super::error::{DocumentError, ReleaserError, RuleError};
use super::publisher::PublishResult;
use super::rules::Strategy;

/// A version bump applied to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartUpdate {
    pub chart: String,
    pub repository: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    Updated(ChartUpdate),
    /// The chart is already at the newest acceptable version.
    NoNewVersion { chart: String },
    NotAutomated,
    /// The document was re-emitted unchanged.
    Failed(DocumentError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReport {
    /// Position of the document in its file, from zero.
    pub index: usize,
    pub outcome: DocumentOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// No document changed; nothing was written.
    Unchanged,
    Published(PublishResult),
    Failed(ReleaserError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: String,
    pub documents: Vec<DocumentReport>,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn failed(path: &str, error: ReleaserError) -> Self {
        Self {
            path: path.to_string(),
            documents: Vec::new(),
            outcome: FileOutcome::Failed(error),
        }
    }

    pub fn updates(&self) -> impl Iterator<Item = &ChartUpdate> {
        self.documents.iter().filter_map(|d| match &d.outcome {
            DocumentOutcome::Updated(update) => Some(update),
            _ => None,
        })
    }

    pub fn is_published(&self) -> bool {
        matches!(self.outcome, FileOutcome::Published(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub branch: String,
    pub pattern: String,
    pub strategy: Strategy,
    pub files: Vec<FileReport>,
    /// Set when the branch or its tree could not be read.
    pub error: Option<ReleaserError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryOutcome {
    /// The repository has no release config.
    Skipped,
    Scanned,
    Failed(ReleaserError),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryReport {
    pub repository: RepositoryId,
    pub rejected_rules: Vec<RuleError>,
    pub rules: Vec<RuleReport>,
    pub outcome: RepositoryOutcome,
}

impl RepositoryReport {
    pub fn new(repository: RepositoryId, outcome: RepositoryOutcome) -> Self {
        Self {
            repository,
            rejected_rules: Vec::new(),
            rules: Vec::new(),
            outcome,
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &FileReport> {
        self.rules.iter().flat_map(|r| r.files.iter())
    }

    /// Human-readable failure messages from every level of this repository.
    pub fn failures(&self) -> Vec<String> {
        let prefix = self.repository.full_name();
        let mut failures = Vec::new();
        if let RepositoryOutcome::Failed(e) = &self.outcome {
            failures.push(format!("{}: {}", prefix, e));
        }
        for e in &self.rejected_rules {
            failures.push(format!("{}: {}", prefix, e));
        }
        for rule in &self.rules {
            if let Some(e) = &rule.error {
                failures.push(format!("{}@{}: {}", prefix, rule.branch, e));
            }
            for file in &rule.files {
                if let FileOutcome::Failed(e) = &file.outcome {
                    failures.push(format!("{}:{}: {}", prefix, file.path, e));
                }
                for doc in &file.documents {
                    if let DocumentOutcome::Failed(e) = &doc.outcome {
                        failures.push(format!("{}:{}#{}: {}", prefix, file.path, doc.index, e));
                    }
                }
            }
        }
        failures
    }
}

/// An installation that could not be connected or listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationFailure {
    pub installation: u64,
    pub account: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub installation_failures: Vec<InstallationFailure>,
    pub repositories: Vec<RepositoryReport>,
    pub cancelled: bool,
}

/// A proposed change, as listed in a [`ScanSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedChange {
    pub repository: String,
    pub path: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    pub updates: Vec<ChartUpdate>,
}

/// Serialisable overview of a [`ScanReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repositories: usize,
    pub repositories_skipped: usize,
    pub repositories_failed: usize,
    pub files_matched: usize,
    pub files_published: usize,
    pub documents_updated: usize,
    pub changes: Vec<PublishedChange>,
    pub failures: Vec<String>,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn summary(&self) -> ScanSummary {
        let mut summary = ScanSummary {
            started_at: self.started_at,
            finished_at: self.finished_at,
            repositories: self.repositories.len(),
            repositories_skipped: 0,
            repositories_failed: 0,
            files_matched: 0,
            files_published: 0,
            documents_updated: 0,
            changes: Vec::new(),
            failures: self
                .installation_failures
                .iter()
                .map(|f| format!("installation {} ({}): {}", f.installation, f.account, f.message))
                .collect(),
            cancelled: self.cancelled,
        };

        for repo in &self.repositories {
            match repo.outcome {
                RepositoryOutcome::Skipped => summary.repositories_skipped += 1,
                RepositoryOutcome::Failed(_) => summary.repositories_failed += 1,
                RepositoryOutcome::Scanned | RepositoryOutcome::Cancelled => {}
            }
            summary.failures.extend(repo.failures());

            for file in repo.files() {
                summary.files_matched += 1;
                let FileOutcome::Published(result) = &file.outcome else {
                    continue;
                };
                let updates: Vec<ChartUpdate> = file.updates().cloned().collect();
                summary.files_published += 1;
                summary.documents_updated += updates.len();
                summary.changes.push(PublishedChange {
                    repository: repo.repository.full_name(),
                    path: file.path.clone(),
                    branch: result.branch().to_string(),
                    pull_request_url: result.pull_request().map(|p| p.url.clone()),
                    updates,
                });
            }
        }

        summary
    }
}
