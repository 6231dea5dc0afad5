use crate::config::GitHubConfig;
use crate::github::sealed::{EncryptedSecret, RepoPublicKey};
use async_trait::async_trait;
use connector_types::RepositoryTarget;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use zeroize::Zeroizing;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub REST API errors
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for GitHub operations
pub type GitHubResult<T> = Result<T, GitHubError>;

/// Access to a repository's Actions secrets.
#[async_trait]
pub trait RepoSecretStore: Send + Sync {
    /// Fetch the key secrets for `repo` must be encrypted with.
    async fn public_key(&self, repo: &RepositoryTarget) -> GitHubResult<RepoPublicKey>;

    /// Create or update one Actions secret.
    async fn put_secret(
        &self,
        repo: &RepositoryTarget,
        name: &str,
        secret: &EncryptedSecret,
    ) -> GitHubResult<()>;
}

/// Authenticated GitHub user
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
}

/// Error body GitHub sends with non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Client for the GitHub REST API
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    config: Arc<GitHubConfig>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.config.api_url)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a new client from config
    pub fn new(config: &GitHubConfig) -> GitHubResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            config: Arc::new(config.clone()),
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// Bind a user or installation token to this client.
    pub fn authenticated(&self, token: impl Into<String>) -> AuthenticatedGitHub {
        AuthenticatedGitHub {
            client: self.clone(),
            token: Zeroizing::new(token.into()),
        }
    }

    /// Exchange a manifest code for the created app's credentials.
    ///
    /// This endpoint is unauthenticated; the code itself is the proof.
    pub async fn convert_app_manifest<T>(&self, code: &str) -> GitHubResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GitHubError::InvalidArgument(
                "manifest code must be alphanumeric".to_string(),
            ));
        }
        let url = self
            .config
            .endpoint(&format!("/app-manifests/{}/conversions", code));
        debug!("Converting GitHub App manifest code");

        let response = self.http.post(&url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// A GitHub client carrying a bearer token
pub struct AuthenticatedGitHub {
    client: GitHubClient,
    token: Zeroizing<String>,
}

impl std::fmt::Debug for AuthenticatedGitHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedGitHub")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedGitHub {
    fn url(&self, path: &str) -> String {
        self.client.config.endpoint(path)
    }

    /// Resolve the user the token belongs to
    pub async fn current_user(&self) -> GitHubResult<GitHubUser> {
        let response = self
            .client
            .http
            .get(self.url("/user"))
            .bearer_auth(self.token.as_str())
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RepoSecretStore for AuthenticatedGitHub {
    async fn public_key(&self, repo: &RepositoryTarget) -> GitHubResult<RepoPublicKey> {
        let url = self.url(&format!(
            "/repos/{}/{}/actions/secrets/public-key",
            repo.owner, repo.name
        ));
        debug!("Fetching Actions public key for {}", repo);

        let response = self
            .client
            .http
            .get(&url)
            .bearer_auth(self.token.as_str())
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn put_secret(
        &self,
        repo: &RepositoryTarget,
        name: &str,
        secret: &EncryptedSecret,
    ) -> GitHubResult<()> {
        let url = self.url(&format!(
            "/repos/{}/{}/actions/secrets/{}",
            repo.owner, repo.name, name
        ));
        debug!("Writing Actions secret {} to {}", name, repo);

        let response = self
            .client
            .http
            .put(&url)
            .bearer_auth(self.token.as_str())
            .json(secret)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `GitHubError::Api` carrying GitHub's message
async fn check_status(response: Response) -> GitHubResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                body
            }
        });
    error!("GitHub request failed with status {}: {}", status, message);

    Err(GitHubError::Api {
        status: status.as_u16(),
        message,
    })
}
