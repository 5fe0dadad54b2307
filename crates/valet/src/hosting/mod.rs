//! Source-hosting collaborator.
//!
//! The reconciler only talks to the hosting service through [`SourceHost`]:
//! refs, recursive trees, blobs, file commits and pull requests. The GitHub
//! REST implementation lives in [`github`], GitHub App authentication and
//! installation discovery in [`app`], and an in-memory implementation for
//! tests and dry runs in [`memory`].

pub mod app;
pub mod error;
pub mod github;
pub mod memory;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use app::GitHubApp;
pub use error::{HostError, Result};
pub use github::GitHubClient;
pub use memory::{MemoryHost, MemoryInstallations};

/// Owner and name of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId {
    pub owner: String,
    pub name: String,
}

impl RepositoryId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A repository reachable through an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: RepositoryId,
    pub default_branch: String,
}

/// A branch head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub branch: String,
    pub sha: String,
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule pointer.
    Commit,
}

impl EntryKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "blob" => Some(EntryKind::Blob),
            "tree" => Some(EntryKind::Tree),
            "commit" => Some(EntryKind::Commit),
            _ => None,
        }
    }
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    /// Content hash of the blob.
    pub sha: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}

/// A file commit through the contents API.
#[derive(Debug, Clone)]
pub struct FileUpdate {
    pub path: String,
    pub message: String,
    pub content: String,
    pub branch: String,
    /// Blob sha of the file being replaced.
    pub sha: String,
}

/// The commit created by a [`FileUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub sha: String,
}

#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub head: String,
    pub base: String,
}

/// A GitHub App installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Installation {
    pub id: u64,
    pub account: String,
}

/// Operations the reconciler needs from a hosting service.
///
/// Every call takes a cancellation token and returns
/// [`HostError::Cancelled`] as soon as it fires. Implementations never retry.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Resolves `heads/<branch>`.
    async fn get_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Reference>;

    /// Like [`SourceHost::get_ref`], but a missing branch is `Ok(None)`.
    async fn find_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Reference>> {
        match self.get_ref(repo, branch, cancel).await {
            Ok(reference) => Ok(Some(reference)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists every entry reachable from commit `sha`.
    async fn get_tree(
        &self,
        repo: &RepositoryId,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TreeEntry>>;

    async fn get_blob(
        &self,
        repo: &RepositoryId,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;

    async fn create_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Reference>;

    /// Moves an existing branch, optionally discarding commits.
    async fn update_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        sha: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Reference>;

    async fn update_file(
        &self,
        repo: &RepositoryId,
        update: &FileUpdate,
        cancel: &CancellationToken,
    ) -> Result<Commit>;

    async fn create_pull_request(
        &self,
        repo: &RepositoryId,
        request: &NewPullRequest,
        cancel: &CancellationToken,
    ) -> Result<PullRequest>;

    /// Finds an open pull request from `head`, whatever its base.
    async fn find_open_pull_request(
        &self,
        repo: &RepositoryId,
        head: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PullRequest>>;

    /// Reads a file at `git_ref`; a missing file is [`HostError::NotFound`].
    async fn download_contents(
        &self,
        repo: &RepositoryId,
        path: &str,
        git_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;

    /// Repositories visible to this client.
    async fn list_repositories(&self, cancel: &CancellationToken) -> Result<Vec<Repository>>;
}

/// Source of installations and of a client scoped to each one.
#[async_trait]
pub trait InstallationProvider: Send + Sync {
    async fn list_installations(&self, cancel: &CancellationToken) -> Result<Vec<Installation>>;

    async fn connect(
        &self,
        installation: &Installation,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn SourceHost>>;
}

/// Runs `future` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(
    operation: &'static str,
    cancel: &CancellationToken,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match cancel.run_until_cancelled(future).await {
        Some(result) => result,
        None => Err(HostError::Cancelled { operation }),
    }
}
