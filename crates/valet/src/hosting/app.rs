//! GitHub App authentication and installation discovery.
//!
//! The app signs a short-lived RS256 JWT with its private key, lists its
//! installations, and exchanges the JWT for an installation access token
//! that scopes a [`GitHubClient`] to one installation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{HostError, Result};
use super::github::{create_http_client, decode, github_request, send, DEFAULT_API_BASE_URL};
use super::{cancellable, GitHubClient, Installation, InstallationProvider, SourceHost};

/// Backdating of `iat` to absorb clock drift.
const JWT_BACKDATE_SECS: i64 = 60;
/// GitHub caps app JWTs at ten minutes.
const JWT_LIFETIME_SECS: i64 = 600;

const PAGE_SIZE: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationResponse {
    id: u64,
    account: Option<AccountResponse>,
}

#[derive(Deserialize)]
struct AccountResponse {
    login: String,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
}

/// A GitHub App identity.
pub struct GitHubApp {
    client: Client,
    api_base_url: String,
    app_id: u64,
    private_key: SecretString,
}

impl GitHubApp {
    pub fn new(app_id: u64, private_key: SecretString) -> Result<Self> {
        Self::with_base_url(DEFAULT_API_BASE_URL, app_id, private_key)
    }

    pub fn with_base_url(api_base_url: &str, app_id: u64, private_key: SecretString) -> Result<Self> {
        let app = Self {
            client: create_http_client()?,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            app_id,
            private_key,
        };
        // Reject an unusable key up front.
        app.encoding_key()?;
        Ok(app)
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    fn encoding_key(&self) -> Result<EncodingKey> {
        EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| HostError::Auth(format!("invalid app private key: {}", e)))
    }

    /// Signs an app JWT valid for ten minutes from `now`.
    fn generate_jwt(&self, now: i64) -> Result<String> {
        let claims = Claims {
            iat: now - JWT_BACKDATE_SECS,
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key()?)
            .map_err(|e| HostError::Auth(format!("failed to sign app JWT: {}", e)))
    }

    async fn installation_token(&self, installation: &Installation) -> Result<SecretString> {
        const OP: &str = "create_installation_token";
        let jwt = self.generate_jwt(Utc::now().timestamp())?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base_url, installation.id
        );
        let request = github_request(&self.client, Method::POST, &url, &jwt);
        let response = send(OP, &installation.account, request).await?;
        let body: AccessTokenResponse = decode(OP, response).await?;
        debug!(installation = installation.id, "Obtained installation token");
        Ok(SecretString::from(body.token))
    }
}

#[async_trait]
impl InstallationProvider for GitHubApp {
    async fn list_installations(&self, cancel: &CancellationToken) -> Result<Vec<Installation>> {
        const OP: &str = "list_installations";
        let url = format!("{}/app/installations", self.api_base_url);
        cancellable(OP, cancel, async {
            let jwt = self.generate_jwt(Utc::now().timestamp())?;
            let mut installations = Vec::new();
            for page in 1.. {
                let request = github_request(&self.client, Method::GET, &url, &jwt).query(&[
                    ("per_page", PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ]);
                let body: Vec<InstallationResponse> = decode(OP, send(OP, "app", request).await?).await?;
                let count = body.len();
                installations.extend(body.into_iter().map(|i| Installation {
                    id: i.id,
                    account: i.account.map(|a| a.login).unwrap_or_default(),
                }));
                if count < PAGE_SIZE {
                    break;
                }
            }
            info!(count = installations.len(), "Listed app installations");
            Ok(installations)
        })
        .await
    }

    async fn connect(
        &self,
        installation: &Installation,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn SourceHost>> {
        let token = cancellable(
            "create_installation_token",
            cancel,
            self.installation_token(installation),
        )
        .await?;
        let client = GitHubClient::with_base_url(&self.api_base_url, token)?;
        Ok(Arc::new(client))
    }
}
