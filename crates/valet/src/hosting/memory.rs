//! In-memory [`SourceHost`] for tests and dry runs.
//!
//! Mirrors the GitHub semantics the reconciler relies on: creating an
//! existing ref is a 422, committing with a stale blob sha is a 409, and a
//! second open pull request for the same head and base is a 422.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::{HostError, Result};
use super::{
    Commit, EntryKind, FileUpdate, Installation, InstallationProvider, NewPullRequest,
    PullRequest, Reference, Repository, RepositoryId, SourceHost, TreeEntry,
};

/// A pull request as recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
    pub open: bool,
}

#[derive(Debug, Default)]
struct RepoState {
    default_branch: String,
    /// Branch name to commit sha.
    branches: BTreeMap<String, String>,
    /// Commit sha to its file snapshot (path to blob sha).
    commits: HashMap<String, BTreeMap<String, String>>,
    pulls: Vec<PullRequestRecord>,
}

#[derive(Debug, Default)]
struct State {
    repos: BTreeMap<RepositoryId, RepoState>,
    blobs: HashMap<String, Vec<u8>>,
    next_id: u64,
    failures: HashMap<&'static str, HostError>,
    calls: Vec<&'static str>,
}

impl State {
    fn next_sha(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:08x}", prefix, self.next_id)
    }

    fn repo(&self, operation: &'static str, repo: &RepositoryId) -> Result<&RepoState> {
        self.repos.get(repo).ok_or_else(|| HostError::NotFound {
            operation,
            resource: repo.full_name(),
        })
    }

    fn repo_mut(&mut self, operation: &'static str, repo: &RepositoryId) -> Result<&mut RepoState> {
        self.repos.get_mut(repo).ok_or_else(|| HostError::NotFound {
            operation,
            resource: repo.full_name(),
        })
    }

    /// Stores `content` and commits it on top of `branch`.
    fn commit_file(
        &mut self,
        operation: &'static str,
        repo: &RepositoryId,
        branch: &str,
        path: &str,
        content: Vec<u8>,
    ) -> Result<String> {
        let blob = self.next_sha("b");
        let commit = self.next_sha("c");
        let state = self.repo_mut(operation, repo)?;
        let head = state
            .branches
            .get(branch)
            .ok_or_else(|| HostError::NotFound {
                operation,
                resource: branch.to_string(),
            })?;
        let mut files = state.commits.get(head).cloned().unwrap_or_default();
        files.insert(path.to_string(), blob.clone());
        state.commits.insert(commit.clone(), files);
        state.branches.insert(branch.to_string(), commit.clone());
        self.blobs.insert(blob, content);
        Ok(commit)
    }
}

fn conflict(operation: &'static str, status: u16, message: impl Into<String>) -> HostError {
    HostError::Api {
        operation,
        status,
        message: message.into(),
    }
}

/// A thread-safe in-memory hosting service.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns an injected failure or cancellation.
    fn enter(&self, operation: &'static str, cancel: &CancellationToken) -> Result<MutexGuard<'_, State>> {
        if cancel.is_cancelled() {
            return Err(HostError::Cancelled { operation });
        }
        let mut state = self.lock();
        state.calls.push(operation);
        if let Some(error) = state.failures.get(operation) {
            return Err(error.clone());
        }
        Ok(state)
    }

    /// Creates an empty repository with one initial commit on `default_branch`.
    pub fn add_repository(&self, owner: &str, name: &str, default_branch: &str) -> RepositoryId {
        let id = RepositoryId::new(owner, name);
        let mut state = self.lock();
        let commit = state.next_sha("c");
        let mut repo = RepoState {
            default_branch: default_branch.to_string(),
            ..RepoState::default()
        };
        repo.commits.insert(commit.clone(), BTreeMap::new());
        repo.branches.insert(default_branch.to_string(), commit);
        state.repos.insert(id.clone(), repo);
        id
    }

    /// Creates `branch` at the head of `from`.
    pub fn add_branch(&self, repo: &RepositoryId, from: &str, branch: &str) {
        let mut state = self.lock();
        if let Some(repo) = state.repos.get_mut(repo) {
            if let Some(head) = repo.branches.get(from).cloned() {
                repo.branches.insert(branch.to_string(), head);
            }
        }
    }

    /// Commits `content` at `path` directly on `branch`.
    pub fn put_file(&self, repo: &RepositoryId, branch: &str, path: &str, content: &str) {
        let mut state = self.lock();
        // Test setup on an unknown repository or branch is a no-op.
        let _ = state.commit_file("put_file", repo, branch, path, content.as_bytes().to_vec());
    }

    /// Content of `path` at the head of `branch`.
    pub fn file_content(&self, repo: &RepositoryId, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        let repo = state.repos.get(repo)?;
        let head = repo.branches.get(branch)?;
        let blob = repo.commits.get(head)?.get(path)?;
        state
            .blobs
            .get(blob)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn head(&self, repo: &RepositoryId, branch: &str) -> Option<String> {
        let state = self.lock();
        state.repos.get(repo)?.branches.get(branch).cloned()
    }

    pub fn branches(&self, repo: &RepositoryId) -> Vec<String> {
        let state = self.lock();
        state
            .repos
            .get(repo)
            .map(|r| r.branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pull_requests(&self, repo: &RepositoryId) -> Vec<PullRequestRecord> {
        let state = self.lock();
        state
            .repos
            .get(repo)
            .map(|r| r.pulls.clone())
            .unwrap_or_default()
    }

    pub fn close_pull_request(&self, repo: &RepositoryId, number: u64) {
        let mut state = self.lock();
        if let Some(repo) = state.repos.get_mut(repo) {
            for pr in repo.pulls.iter_mut().filter(|pr| pr.number == number) {
                pr.open = false;
            }
        }
    }

    /// Makes every later call of `operation` fail with `error`.
    pub fn fail_operation(&self, operation: &'static str, error: HostError) {
        self.lock().failures.insert(operation, error);
    }

    /// Number of calls made to `operation`, including failed ones.
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == operation).count()
    }

    /// Calls that can change state.
    pub fn write_count(&self) -> usize {
        const WRITES: &[&str] = &["create_ref", "update_ref", "update_file", "create_pull_request"];
        self.lock()
            .calls
            .iter()
            .filter(|c| WRITES.contains(*c))
            .count()
    }
}

#[async_trait]
impl SourceHost for MemoryHost {
    async fn get_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Reference> {
        const OP: &str = "get_ref";
        let state = self.enter(OP, cancel)?;
        let sha = state
            .repo(OP, repo)?
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| HostError::NotFound {
                operation: OP,
                resource: branch.to_string(),
            })?;
        Ok(Reference {
            branch: branch.to_string(),
            sha,
        })
    }

    async fn get_tree(
        &self,
        repo: &RepositoryId,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TreeEntry>> {
        const OP: &str = "get_tree";
        let state = self.enter(OP, cancel)?;
        let files = state
            .repo(OP, repo)?
            .commits
            .get(sha)
            .ok_or_else(|| HostError::NotFound {
                operation: OP,
                resource: sha.to_string(),
            })?;

        let mut directories = BTreeSet::new();
        for path in files.keys() {
            let mut prefix = path.as_str();
            while let Some((parent, _)) = prefix.rsplit_once('/') {
                directories.insert(parent.to_string());
                prefix = parent;
            }
        }

        let mut entries: Vec<TreeEntry> = directories
            .into_iter()
            .map(|path| TreeEntry {
                sha: format!("t-{}", path),
                path,
                kind: EntryKind::Tree,
            })
            .collect();
        entries.extend(files.iter().map(|(path, blob)| TreeEntry {
            path: path.clone(),
            sha: blob.clone(),
            kind: EntryKind::Blob,
        }));
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn get_blob(
        &self,
        _repo: &RepositoryId,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        const OP: &str = "get_blob";
        let state = self.enter(OP, cancel)?;
        state.blobs.get(sha).cloned().ok_or_else(|| HostError::NotFound {
            operation: OP,
            resource: sha.to_string(),
        })
    }

    async fn create_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Reference> {
        const OP: &str = "create_ref";
        let mut state = self.enter(OP, cancel)?;
        let repo = state.repo_mut(OP, repo)?;
        if repo.branches.contains_key(branch) {
            return Err(conflict(OP, 422, "Reference already exists"));
        }
        if !repo.commits.contains_key(sha) {
            return Err(conflict(OP, 422, "Object does not exist"));
        }
        repo.branches.insert(branch.to_string(), sha.to_string());
        Ok(Reference {
            branch: branch.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn update_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        sha: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Reference> {
        const OP: &str = "update_ref";
        let mut state = self.enter(OP, cancel)?;
        let repo = state.repo_mut(OP, repo)?;
        if !repo.commits.contains_key(sha) {
            return Err(conflict(OP, 422, "Object does not exist"));
        }
        if !repo.branches.contains_key(branch) {
            return Err(HostError::NotFound {
                operation: OP,
                resource: branch.to_string(),
            });
        }
        if !force {
            return Err(conflict(OP, 422, "Update is not a fast forward"));
        }
        repo.branches.insert(branch.to_string(), sha.to_string());
        Ok(Reference {
            branch: branch.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn update_file(
        &self,
        repo: &RepositoryId,
        update: &FileUpdate,
        cancel: &CancellationToken,
    ) -> Result<Commit> {
        const OP: &str = "update_file";
        let mut state = self.enter(OP, cancel)?;
        let current = {
            let repo = state.repo(OP, repo)?;
            let head = repo
                .branches
                .get(&update.branch)
                .ok_or_else(|| HostError::NotFound {
                    operation: OP,
                    resource: update.branch.clone(),
                })?;
            repo.commits
                .get(head)
                .and_then(|files| files.get(&update.path))
                .cloned()
        };
        if current.as_deref().unwrap_or_default() != update.sha {
            return Err(conflict(
                OP,
                409,
                format!("{} does not match {}", update.path, update.sha),
            ));
        }
        let sha = state.commit_file(
            OP,
            repo,
            &update.branch,
            &update.path,
            update.content.as_bytes().to_vec(),
        )?;
        Ok(Commit { sha })
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryId,
        request: &NewPullRequest,
        cancel: &CancellationToken,
    ) -> Result<PullRequest> {
        const OP: &str = "create_pull_request";
        let mut state = self.enter(OP, cancel)?;
        let number = {
            let repo = state.repo(OP, repo)?;
            if !repo.branches.contains_key(&request.head) {
                return Err(conflict(OP, 422, "head does not exist"));
            }
            if repo
                .pulls
                .iter()
                .any(|pr| pr.open && pr.head == request.head && pr.base == request.base)
            {
                return Err(conflict(OP, 422, "A pull request already exists"));
            }
            repo.pulls.len() as u64 + 1
        };
        let url = format!("https://example.invalid/{}/pull/{}", repo, number);
        state.repo_mut(OP, repo)?.pulls.push(PullRequestRecord {
            number,
            title: request.title.clone(),
            head: request.head.clone(),
            base: request.base.clone(),
            body: request.body.clone(),
            open: true,
        });
        Ok(PullRequest {
            number,
            url,
            head: request.head.clone(),
            base: request.base.clone(),
        })
    }

    async fn find_open_pull_request(
        &self,
        repo: &RepositoryId,
        head: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PullRequest>> {
        const OP: &str = "find_open_pull_request";
        let state = self.enter(OP, cancel)?;
        Ok(state
            .repo(OP, repo)?
            .pulls
            .iter()
            .find(|pr| pr.open && pr.head == head)
            .map(|pr| PullRequest {
                number: pr.number,
                url: format!("https://example.invalid/{}/pull/{}", repo, pr.number),
                head: pr.head.clone(),
                base: pr.base.clone(),
            }))
    }

    async fn download_contents(
        &self,
        repo: &RepositoryId,
        path: &str,
        git_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        const OP: &str = "download_contents";
        let state = self.enter(OP, cancel)?;
        let not_found = || HostError::NotFound {
            operation: OP,
            resource: path.to_string(),
        };
        let repo = state.repo(OP, repo)?;
        let head = repo.branches.get(git_ref).ok_or_else(not_found)?;
        let blob = repo
            .commits
            .get(head)
            .and_then(|files| files.get(path))
            .ok_or_else(not_found)?;
        state.blobs.get(blob).cloned().ok_or_else(not_found)
    }

    async fn list_repositories(&self, cancel: &CancellationToken) -> Result<Vec<Repository>> {
        let state = self.enter("list_repositories", cancel)?;
        Ok(state
            .repos
            .iter()
            .map(|(id, repo)| Repository {
                id: id.clone(),
                default_branch: repo.default_branch.clone(),
            })
            .collect())
    }
}

/// Installations backed by [`MemoryHost`]s.
#[derive(Default)]
pub struct MemoryInstallations {
    installations: Vec<(Installation, Arc<MemoryHost>)>,
}

impl MemoryInstallations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: u64, account: &str, host: Arc<MemoryHost>) {
        self.installations.push((
            Installation {
                id,
                account: account.to_string(),
            },
            host,
        ));
    }
}

#[async_trait]
impl InstallationProvider for MemoryInstallations {
    async fn list_installations(&self, cancel: &CancellationToken) -> Result<Vec<Installation>> {
        if cancel.is_cancelled() {
            return Err(HostError::Cancelled {
                operation: "list_installations",
            });
        }
        Ok(self.installations.iter().map(|(i, _)| i.clone()).collect())
    }

    async fn connect(
        &self,
        installation: &Installation,
        _cancel: &CancellationToken,
    ) -> Result<Arc<dyn SourceHost>> {
        self.installations
            .iter()
            .find(|(i, _)| i.id == installation.id)
            .map(|(_, host)| Arc::clone(host) as Arc<dyn SourceHost>)
            .ok_or_else(|| HostError::Auth(format!("unknown installation {}", installation.id)))
    }
}
