//! Releaser error types, one enum per granularity.

use thiserror::Error;

use crate::document::YamlError;
use crate::hosting::HostError;
use crate::registry::RegistryError;

use super::constraint::ConstraintError;

/// Failures scoped to a single document of a manifest file.
///
/// These never abort sibling documents: the document is re-emitted unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document is not automated")]
    NotAutomated,

    #[error("Chart filter annotation must be a string, got {value}")]
    FilterNotString { value: String },

    #[error("Invalid chart filter '{value}', expected <kind>:<expression>")]
    MalformedFilter { value: String },

    #[error("Unknown chart filter kind '{kind}'")]
    UnknownFilterKind { kind: String },

    #[error(transparent)]
    InvalidConstraint(#[from] ConstraintError),

    #[error("Missing chart name at spec.chart.name")]
    MissingChartName,

    #[error("Missing chart repository at spec.chart.repository")]
    MissingChartRepository,

    #[error("Missing chart version at spec.chart.version")]
    MissingChartVersion,

    #[error("Invalid current chart version '{value}': {reason}")]
    InvalidCurrentVersion { value: String, reason: String },

    #[error("Failed to list versions of chart '{chart}': {source}")]
    Registry {
        chart: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to write chart version: {0}")]
    Edit(#[from] YamlError),
}

impl DocumentError {
    /// True for outcomes that are part of normal operation, not failures.
    pub fn is_expected(&self) -> bool {
        matches!(self, DocumentError::NotAutomated)
    }

    /// True when the registry lookup was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            DocumentError::Registry {
                source: RegistryError::Cancelled,
                ..
            }
        )
    }
}

/// A rule from the repository's release config that could not be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Rule {index}: invalid files pattern '{pattern}': {reason}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        reason: String,
    },

    #[error("Rule {index}: unknown strategy '{strategy}'")]
    UnknownStrategy { index: usize, strategy: String },

    #[error("Rule {index}: branch must not be empty")]
    EmptyBranch { index: usize },
}

/// Failures while proposing a patched file.
///
/// Earlier steps are not rolled back; a branch created before a failed commit
/// stays in place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Failed to create branch '{branch}': {source}")]
    CreateBranch {
        branch: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to reset branch '{branch}': {source}")]
    ResetBranch {
        branch: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to commit '{path}' to '{branch}': {source}")]
    Commit {
        path: String,
        branch: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to open pull request for '{branch}': {source}")]
    PullRequest {
        branch: String,
        #[source]
        source: HostError,
    },

    #[error("Branch '{branch}' backs open pull request #{number} into '{other_base}', not '{base}'")]
    BranchInUse {
        branch: String,
        base: String,
        other_base: String,
        number: u64,
    },
}

impl PublishError {
    fn host_error(&self) -> Option<&HostError> {
        match self {
            PublishError::CreateBranch { source, .. }
            | PublishError::ResetBranch { source, .. }
            | PublishError::Commit { source, .. }
            | PublishError::PullRequest { source, .. } => Some(source),
            PublishError::BranchInUse { .. } => None,
        }
    }

    /// True when the failing call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.host_error().is_some_and(HostError::is_cancelled)
    }
}

/// Failures at file, rule or repository granularity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReleaserError {
    #[error("Release config '{path}' not found")]
    FileMissing { path: String },

    #[error("Failed to read release config '{path}': {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to parse release config '{path}': {message}")]
    ParseConfig { path: String, message: String },

    #[error("Failed to resolve branch '{branch}': {source}")]
    GetRef {
        branch: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to list tree of '{branch}': {source}")]
    GetTree {
        branch: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to download '{path}': {source}")]
    GetBlob {
        path: String,
        #[source]
        source: HostError,
    },

    #[error("File '{path}' is not valid UTF-8")]
    NotUtf8 { path: String },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: YamlError,
    },

    #[error("Failed to render '{path}': {source}")]
    Render {
        path: String,
        #[source]
        source: YamlError,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ReleaserError {
    /// True when the error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ReleaserError::Cancelled => true,
            ReleaserError::ReadConfig { source, .. }
            | ReleaserError::GetRef { source, .. }
            | ReleaserError::GetTree { source, .. }
            | ReleaserError::GetBlob { source, .. } => source.is_cancelled(),
            ReleaserError::Publish(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
