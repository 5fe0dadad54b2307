//! GitHub REST implementation of [`SourceHost`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{HostError, Result};
use super::{
    cancellable, Commit, EntryKind, FileUpdate, NewPullRequest, PullRequest, Reference,
    Repository, RepositoryId, SourceHost, TreeEntry,
};

/// Public GitHub API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const USER_AGENT: &str = "valet";
const API_VERSION: &str = "2022-11-28";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";

/// Error bodies are cut to this many characters before they reach logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PAGE_SIZE: usize = 100;

pub(crate) fn sanitize_error_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((at, _)) => format!("{}... (truncated)", &body[..at]),
        None => body.to_string(),
    }
}

pub(crate) fn create_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| HostError::Transport {
            operation: "create_http_client",
            message: e.to_string(),
        })
}

/// Attaches the headers every GitHub call carries.
pub(crate) fn github_request(
    client: &Client,
    method: Method,
    url: &str,
    token: &str,
) -> RequestBuilder {
    client
        .request(method, url)
        .header("Accept", ACCEPT_JSON)
        .header("User-Agent", USER_AGENT)
        .header("X-GitHub-Api-Version", API_VERSION)
        .bearer_auth(token)
}

/// Sends `request` and maps non-success statuses onto [`HostError`].
pub(crate) async fn send(
    operation: &'static str,
    resource: &str,
    request: RequestBuilder,
) -> Result<Response> {
    let response = request.send().await.map_err(|e| HostError::Transport {
        operation,
        message: e.to_string(),
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(HostError::NotFound {
            operation,
            resource: resource.to_string(),
        });
    }
    let body = response.text().await.unwrap_or_default();
    Err(HostError::Api {
        operation,
        status: status.as_u16(),
        message: sanitize_error_body(&body),
    })
}

pub(crate) async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T> {
    response.json().await.map_err(|e| HostError::Decode {
        operation,
        message: e.to_string(),
    })
}

async fn bytes(operation: &'static str, response: Response) -> Result<Vec<u8>> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| HostError::Transport {
            operation,
            message: e.to_string(),
        })
}

/// Percent-encodes each path segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            for byte in segment.bytes() {
                match byte {
                    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                        out.push(byte as char)
                    }
                    _ => out.push_str(&format!("%{:02X}", byte)),
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    name: String,
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct UpdateFileRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    sha: &'a str,
}

#[derive(Deserialize)]
struct UpdateFileResponse {
    commit: CommitObject,
}

#[derive(Deserialize)]
struct CommitObject {
    sha: String,
}

#[derive(Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
    head: PullRequestRef,
    base: PullRequestRef,
}

#[derive(Deserialize)]
struct PullRequestRef {
    #[serde(rename = "ref")]
    name: String,
}

impl From<PullRequestResponse> for PullRequest {
    fn from(pr: PullRequestResponse) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.name,
            base: pr.base.name,
        }
    }
}

#[derive(Deserialize)]
struct RepositoriesResponse {
    repositories: Vec<RepositoryResponse>,
}

#[derive(Deserialize)]
struct RepositoryResponse {
    name: String,
    owner: OwnerResponse,
    default_branch: String,
    #[serde(default)]
    archived: bool,
}

#[derive(Deserialize)]
struct OwnerResponse {
    login: String,
}

fn branch_of(name: &str) -> &str {
    name.strip_prefix("refs/heads/").unwrap_or(name)
}

/// A GitHub client authenticated with one token.
///
/// With an installation token, [`SourceHost::list_repositories`] returns the
/// repositories granted to that installation.
pub struct GitHubClient {
    client: Client,
    api_base_url: String,
    token: SecretString,
}

impl GitHubClient {
    pub fn new(token: SecretString) -> Result<Self> {
        Self::with_base_url(DEFAULT_API_BASE_URL, token)
    }

    pub fn with_base_url(api_base_url: &str, token: SecretString) -> Result<Self> {
        Ok(Self {
            client: create_http_client()?,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn repo_url(&self, repo: &RepositoryId, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base_url, repo.owner, repo.name, rest
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        github_request(&self.client, method, url, self.token.expose_secret())
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn get_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Reference> {
        const OP: &str = "get_ref";
        let url = self.repo_url(repo, &format!("git/ref/heads/{}", encode_path(branch)));
        cancellable(OP, cancel, async {
            let response = send(OP, branch, self.request(Method::GET, &url)).await?;
            let body: RefResponse = decode(OP, response).await?;
            Ok(Reference {
                branch: branch_of(&body.name).to_string(),
                sha: body.object.sha,
            })
        })
        .await
    }

    async fn get_tree(
        &self,
        repo: &RepositoryId,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TreeEntry>> {
        const OP: &str = "get_tree";
        let url = self.repo_url(repo, &format!("git/trees/{}?recursive=1", sha));
        cancellable(OP, cancel, async {
            let response = send(OP, sha, self.request(Method::GET, &url)).await?;
            let body: TreeResponse = decode(OP, response).await?;
            if body.truncated {
                warn!(repository = %repo, sha, "Tree listing was truncated by the API");
            }
            Ok(body
                .tree
                .into_iter()
                .filter_map(|item| {
                    let kind = EntryKind::parse(&item.kind)?;
                    Some(TreeEntry {
                        path: item.path,
                        sha: item.sha,
                        kind,
                    })
                })
                .collect())
        })
        .await
    }

    async fn get_blob(
        &self,
        repo: &RepositoryId,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        const OP: &str = "get_blob";
        let url = self.repo_url(repo, &format!("git/blobs/{}", sha));
        cancellable(OP, cancel, async {
            let request = self
                .request(Method::GET, &url)
                .header("Accept", ACCEPT_RAW);
            bytes(OP, send(OP, sha, request).await?).await
        })
        .await
    }

    async fn create_ref(
        &self,
        repo: &RepositoryId,
        branch: &str,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<Reference> {
        const OP: &str = "create_ref";
        let url = self.repo_url(repo, "git/refs");
        let payload = CreateRefRequest {
            name: format!("refs/heads/{}", branch),
            sha,
        };
        cancellable(OP, cancel, async {
            debug!(repository = %repo, branch, sha, "Creating branch");
            let response = send(OP, branch, self.request(Method::POST, &url).json(&payload)).await?;
            let body: RefResponse = decode(OP, response).await?;
            Ok(Reference {
                branch: branch_of(&body.name).to_string(),
                sha: body.object.sha,
            })
        })
        .await
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
        let url = self.repo_url(repo, &format!("git/refs/heads/{}", encode_path(branch)));
        let payload = UpdateRefRequest { sha, force };
        cancellable(OP, cancel, async {
            debug!(repository = %repo, branch, sha, force, "Moving branch");
            let response =
                send(OP, branch, self.request(Method::PATCH, &url).json(&payload)).await?;
            let body: RefResponse = decode(OP, response).await?;
            Ok(Reference {
                branch: branch_of(&body.name).to_string(),
                sha: body.object.sha,
            })
        })
        .await
    }

    async fn update_file(
        &self,
        repo: &RepositoryId,
        update: &FileUpdate,
        cancel: &CancellationToken,
    ) -> Result<Commit> {
        const OP: &str = "update_file";
        let url = self.repo_url(repo, &format!("contents/{}", encode_path(&update.path)));
        let payload = UpdateFileRequest {
            message: &update.message,
            content: BASE64.encode(update.content.as_bytes()),
            branch: &update.branch,
            sha: &update.sha,
        };
        cancellable(OP, cancel, async {
            let response =
                send(OP, &update.path, self.request(Method::PUT, &url).json(&payload)).await?;
            let body: UpdateFileResponse = decode(OP, response).await?;
            Ok(Commit {
                sha: body.commit.sha,
            })
        })
        .await
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryId,
        request: &NewPullRequest,
        cancel: &CancellationToken,
    ) -> Result<PullRequest> {
        const OP: &str = "create_pull_request";
        let url = self.repo_url(repo, "pulls");
        let payload = CreatePullRequest {
            title: &request.title,
            head: &request.head,
            base: &request.base,
            body: &request.body,
        };
        cancellable(OP, cancel, async {
            let response =
                send(OP, &request.head, self.request(Method::POST, &url).json(&payload)).await?;
            let body: PullRequestResponse = decode(OP, response).await?;
            Ok(body.into())
        })
        .await
    }

    async fn find_open_pull_request(
        &self,
        repo: &RepositoryId,
        head: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PullRequest>> {
        const OP: &str = "find_open_pull_request";
        let url = self.repo_url(repo, "pulls");
        let query = [
            ("head", format!("{}:{}", repo.owner, head)),
            ("state", "open".to_string()),
        ];
        cancellable(OP, cancel, async {
            let response = send(OP, head, self.request(Method::GET, &url).query(&query)).await?;
            let body: Vec<PullRequestResponse> = decode(OP, response).await?;
            Ok(body.into_iter().next().map(PullRequest::from))
        })
        .await
    }

    async fn download_contents(
        &self,
        repo: &RepositoryId,
        path: &str,
        git_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        const OP: &str = "download_contents";
        let url = self.repo_url(repo, &format!("contents/{}", encode_path(path)));
        cancellable(OP, cancel, async {
            let request = self
                .request(Method::GET, &url)
                .query(&[("ref", git_ref)])
                .header("Accept", ACCEPT_RAW);
            bytes(OP, send(OP, path, request).await?).await
        })
        .await
    }

    async fn list_repositories(&self, cancel: &CancellationToken) -> Result<Vec<Repository>> {
        const OP: &str = "list_repositories";
        let url = format!("{}/installation/repositories", self.api_base_url);
        cancellable(OP, cancel, async {
            let mut repositories = Vec::new();
            for page in 1.. {
                let request = self.request(Method::GET, &url).query(&[
                    ("per_page", PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ]);
                let body: RepositoriesResponse =
                    decode(OP, send(OP, "installation", request).await?).await?;
                let count = body.repositories.len();
                repositories.extend(body.repositories.into_iter().filter(|r| !r.archived).map(
                    |r| Repository {
                        id: RepositoryId::new(r.owner.login, r.name),
                        default_branch: r.default_branch,
                    },
                ));
                if count < PAGE_SIZE {
                    break;
                }
            }
            Ok(repositories)
        })
        .await
    }
}
