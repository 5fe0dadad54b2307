//! Proposes a patched file: bump branch, commit and pull request.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hosting::{
    Commit, FileUpdate, HostError, NewPullRequest, PullRequest, Reference, RepositoryId, SourceHost,
};

use super::error::PublishError;
use super::report::ChartUpdate;
use super::rules::Strategy;

const BRANCH_PREFIX: &str = "valet/";
const BRANCH_SUFFIX: &str = "/bump";

/// Longest file path kept verbatim in a branch name; longer paths keep their
/// trailing characters.
pub const MAX_BRANCH_PATH_CHARS: usize = 50;

/// What to do when the bump branch already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchPolicy {
    /// Always create the branch; an existing one fails the publish.
    #[default]
    Fail,
    /// Force the existing branch back to the base commit and reuse its
    /// open pull request.
    Reset,
}

/// Bump branch for `path`: `valet/<path>/bump`, with the path cut to its
/// last [`MAX_BRANCH_PATH_CHARS`] characters.
pub fn branch_name(path: &str) -> String {
    let count = path.chars().count();
    let path = if count > MAX_BRANCH_PATH_CHARS {
        let skip = count - MAX_BRANCH_PATH_CHARS;
        path.char_indices()
            .nth(skip)
            .map(|(at, _)| &path[at..])
            .unwrap_or(path)
    } else {
        path
    };
    format!("{}{}{}", BRANCH_PREFIX, path, BRANCH_SUFFIX)
}

/// Commit message and pull request title for `path`.
pub fn commit_message(path: &str) -> String {
    format!("Bump chart in {}", path)
}

fn pull_request_body(path: &str, updates: &[ChartUpdate]) -> String {
    let mut body = format!("Automated chart bump for `{}`.\n\n", path);
    for update in updates {
        body.push_str(&format!(
            "- `{}` from `{}` to `{}` ({})\n",
            update.chart, update.from, update.to, update.repository
        ));
    }
    body
}

/// A patched file ready to be proposed.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub path: &'a str,
    /// Blob sha of the file on the base branch.
    pub blob_sha: &'a str,
    /// The rule branch the file was read from.
    pub base: &'a Reference,
    pub content: String,
    pub updates: &'a [ChartUpdate],
    pub strategy: Strategy,
}

/// How a file was proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PublishResult {
    PullRequestOpened {
        branch: String,
        commit: Commit,
        pull_request: PullRequest,
    },
    /// The branch was reset and an already open pull request now carries
    /// the new commit.
    PullRequestReused {
        branch: String,
        commit: Commit,
        pull_request: PullRequest,
    },
    /// Committed straight to the rule branch.
    Committed { branch: String, commit: Commit },
}

impl PublishResult {
    pub fn pull_request(&self) -> Option<&PullRequest> {
        match self {
            PublishResult::PullRequestOpened { pull_request, .. }
            | PublishResult::PullRequestReused { pull_request, .. } => Some(pull_request),
            PublishResult::Committed { .. } => None,
        }
    }

    pub fn branch(&self) -> &str {
        match self {
            PublishResult::PullRequestOpened { branch, .. }
            | PublishResult::PullRequestReused { branch, .. }
            | PublishResult::Committed { branch, .. } => branch,
        }
    }
}

/// State of the bump branch before the commit.
enum PreparedBranch {
    Created,
    /// An existing branch was moved to the base commit.
    Reset { open: Option<PullRequest> },
}

/// Publishes files of one repository.
pub struct Publisher<'a> {
    host: &'a dyn SourceHost,
    repository: &'a RepositoryId,
    policy: BranchPolicy,
}

impl<'a> Publisher<'a> {
    pub fn new(host: &'a dyn SourceHost, repository: &'a RepositoryId, policy: BranchPolicy) -> Self {
        Self {
            host,
            repository,
            policy,
        }
    }

    /// Runs the publish steps in order. A failing step stops the sequence;
    /// nothing already created is rolled back.
    pub async fn publish(
        &self,
        request: PublishRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<PublishResult, PublishError> {
        match request.strategy {
            Strategy::Direct => self.commit_direct(request, cancel).await,
            Strategy::PullRequest => self.propose(request, cancel).await,
        }
    }

    async fn commit_direct(
        &self,
        request: PublishRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<PublishResult, PublishError> {
        let branch = request.base.branch.clone();
        let commit = self.commit(&request, &branch, cancel).await?;
        info!(path = request.path, branch = %branch, commit = %commit.sha, "Committed chart bump");
        Ok(PublishResult::Committed { branch, commit })
    }

    async fn propose(
        &self,
        request: PublishRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<PublishResult, PublishError> {
        let branch = branch_name(request.path);
        let prepared = self.prepare_branch(&branch, request.base, cancel).await?;
        let commit = self.commit(&request, &branch, cancel).await?;

        if let PreparedBranch::Reset {
            open: Some(pull_request),
        } = prepared
        {
            info!(path = request.path, branch = %branch, number = pull_request.number, "Updated open pull request");
            return Ok(PublishResult::PullRequestReused {
                branch,
                commit,
                pull_request,
            });
        }

        let title = commit_message(request.path);
        let new_pr = NewPullRequest {
            title,
            head: branch.clone(),
            base: request.base.branch.clone(),
            body: pull_request_body(request.path, request.updates),
        };
        let pull_request = self
            .host
            .create_pull_request(self.repository, &new_pr, cancel)
            .await
            .map_err(|source| PublishError::PullRequest {
                branch: branch.clone(),
                source,
            })?;
        info!(path = request.path, branch = %branch, number = pull_request.number, url = %pull_request.url, "Opened pull request");
        Ok(PublishResult::PullRequestOpened {
            branch,
            commit,
            pull_request,
        })
    }

    /// Points `branch` at the base commit.
    ///
    /// Under [`BranchPolicy::Reset`] an existing branch is force-moved, unless
    /// it backs an open pull request into a different base. Paths matched by
    /// rules on two base branches share one bump branch, and moving it would
    /// rewrite the other pull request.
    async fn prepare_branch(
        &self,
        branch: &str,
        base: &Reference,
        cancel: &CancellationToken,
    ) -> Result<PreparedBranch, PublishError> {
        let reset_error = |source: HostError| PublishError::ResetBranch {
            branch: branch.to_string(),
            source,
        };

        if self.policy == BranchPolicy::Reset {
            let existing = self
                .host
                .find_ref(self.repository, branch, cancel)
                .await
                .map_err(reset_error)?;
            if existing.is_some() {
                let open = self
                    .host
                    .find_open_pull_request(self.repository, branch, cancel)
                    .await
                    .map_err(reset_error)?;
                if let Some(pr) = &open {
                    if pr.base != base.branch {
                        return Err(PublishError::BranchInUse {
                            branch: branch.to_string(),
                            base: base.branch.clone(),
                            other_base: pr.base.clone(),
                            number: pr.number,
                        });
                    }
                }
                debug!(branch, sha = %base.sha, "Resetting existing bump branch");
                self.host
                    .update_ref(self.repository, branch, &base.sha, true, cancel)
                    .await
                    .map_err(reset_error)?;
                return Ok(PreparedBranch::Reset { open });
            }
        }

        self.host
            .create_ref(self.repository, branch, &base.sha, cancel)
            .await
            .map_err(|source| PublishError::CreateBranch {
                branch: branch.to_string(),
                source,
            })?;
        Ok(PreparedBranch::Created)
    }

    async fn commit(
        &self,
        request: &PublishRequest<'_>,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Commit, PublishError> {
        let update = FileUpdate {
            path: request.path.to_string(),
            message: commit_message(request.path),
            content: request.content.clone(),
            branch: branch.to_string(),
            sha: request.blob_sha.to_string(),
        };
        self.host
            .update_file(self.repository, &update, cancel)
            .await
            .map_err(|source| PublishError::Commit {
                path: request.path.to_string(),
                branch: branch.to_string(),
                source,
            })
    }
}
