//! Cluster credentials written into repositories.
//!
//! Under the fresh policy every repository gets its own service account in the
//! connector namespace, plus a `kubernetes.io/service-account-token` secret the
//! token controller fills in. Under the shared policy the connector's own
//! ambient token is reused.

use crate::cluster::ClusterError;
use crate::config::KubernetesConfig;
use async_trait::async_trait;
use connector_types::RepositoryTarget;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

const ANNOTATION_PREFIX: &str = "github-connector.openshift.io";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY_VALUE: &str = "openshift-github-connector";
const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";
const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";
const MAX_NAME_LEN: usize = 63;

/// A credential value to embed in repository secrets.
#[derive(Clone)]
pub struct Credential {
    pub value: String,
    /// Where the credential lives, e.g. `namespace/secret-name`
    pub reference_id: String,
}

impl Credential {
    pub fn new(value: impl Into<String>, reference_id: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            reference_id: reference_id.into(),
        }
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("reference_id", &self.reference_id)
            .finish()
    }
}

/// Who a credential is issued for, recorded on the created resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMetadata {
    pub issued_for_app: Option<String>,
    pub issued_for_user: String,
}

/// Credential issuance failed for one repository.
#[derive(Debug, Error)]
#[error("Failed to issue a service account token for {repo}: {cause}")]
pub struct TokenIssuanceError {
    pub repo: RepositoryTarget,
    #[source]
    pub cause: ClusterError,
}

/// Supplies credentials to the provisioning orchestrator.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Mint a credential scoped to one repository. Every call has side effects;
    /// callers must not call it twice for the same repository in one run.
    async fn issue_token(
        &self,
        repo: &RepositoryTarget,
        metadata: &TokenMetadata,
    ) -> Result<Credential, TokenIssuanceError>;

    /// The connector's own credential, if one is available.
    async fn ambient_token(&self) -> Option<Credential>;
}

/// Ambient credential source: a configured token, else the mounted service
/// account token.
#[derive(Clone)]
pub struct AmbientToken {
    static_token: Option<String>,
    token_path: PathBuf,
}

impl AmbientToken {
    pub fn new(static_token: Option<String>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            static_token: static_token.filter(|t| !t.trim().is_empty()),
            token_path: token_path.into(),
        }
    }

    pub fn from_config(config: &KubernetesConfig) -> Self {
        Self::new(
            config.ambient_token.clone(),
            config.ambient_token_path.clone(),
        )
    }

    pub async fn load(&self) -> Option<Credential> {
        if let Some(token) = &self.static_token {
            return Some(Credential::new(token.trim(), "config:kubernetes.ambient_token"));
        }

        match tokio::fs::read_to_string(&self.token_path).await {
            Ok(mut contents) => {
                let token = contents.trim().to_string();
                contents.zeroize();
                if token.is_empty() {
                    warn!("Ambient token file {} is empty", self.token_path.display());
                    None
                } else {
                    Some(Credential::new(
                        token,
                        format!("file:{}", self.token_path.display()),
                    ))
                }
            }
            Err(e) => {
                debug!(
                    "No ambient token at {}: {}",
                    self.token_path.display(),
                    e
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for AmbientToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientToken")
            .field("static_token", &self.static_token.as_ref().map(|_| "<redacted>"))
            .field("token_path", &self.token_path)
            .finish()
    }
}

/// Issues one service account token per repository.
pub struct ServiceAccountTokenIssuer {
    client: Client,
    namespace: String,
    ambient: AmbientToken,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl std::fmt::Debug for ServiceAccountTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenIssuer")
            .field("namespace", &self.namespace)
            .field("poll_attempts", &self.poll_attempts)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokenIssuer {
    pub fn new(client: Client, config: &KubernetesConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            ambient: AmbientToken::from_config(config),
            poll_attempts: config.token_poll_attempts.max(1),
            poll_interval: config.token_poll_interval(),
        }
    }

    async fn ensure_service_account(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &self.namespace);
        if api.get_opt(name).await?.is_some() {
            debug!("ServiceAccount {}/{} already exists", self.namespace, name);
            return Ok(());
        }

        let service_account = ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(managed_labels()),
                annotations: Some(annotations.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &service_account).await?;
        info!("Created ServiceAccount {}/{}", self.namespace, name);
        Ok(())
    }

    async fn create_token_secret(
        &self,
        service_account: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<String, ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);

        let mut annotations = annotations.clone();
        annotations.insert(
            SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
            service_account.to_string(),
        );

        let secret = Secret {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-token-", service_account)),
                labels: Some(managed_labels()),
                annotations: Some(annotations),
                ..Default::default()
            },
            type_: Some(SERVICE_ACCOUNT_TOKEN_TYPE.to_string()),
            ..Default::default()
        };

        let created = api.create(&PostParams::default(), &secret).await?;
        created.metadata.name.ok_or(ClusterError::MissingName)
    }

    /// Poll until the token controller has populated the secret.
    async fn wait_for_token(&self, secret_name: &str) -> Result<String, ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);

        for attempt in 0..self.poll_attempts {
            if attempt > 0 {
                debug!(
                    "Token for {}/{} not populated yet (attempt {}/{})",
                    self.namespace, secret_name, attempt, self.poll_attempts
                );
                tokio::time::sleep(self.poll_interval).await;
            }

            let secret = api.get(secret_name).await?;
            if let Some(token) = secret.data.as_ref().and_then(|d| d.get("token")) {
                if !token.0.is_empty() {
                    return String::from_utf8(token.0.clone())
                        .map_err(|_| ClusterError::InvalidToken(secret_name.to_string()));
                }
            }
        }

        Err(ClusterError::TokenNotPopulated {
            secret: format!("{}/{}", self.namespace, secret_name),
            attempts: self.poll_attempts,
        })
    }

    async fn delete_token_secret(&self, secret_name: &str) {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.delete(secret_name, &DeleteParams::default()).await {
            Ok(_) => info!(
                "Deleted unused token secret {}/{}",
                self.namespace, secret_name
            ),
            Err(e) => warn!(
                "Failed to delete unused token secret {}/{}: {}",
                self.namespace, secret_name, e
            ),
        }
    }

    async fn issue(
        &self,
        repo: &RepositoryTarget,
        metadata: &TokenMetadata,
    ) -> Result<Credential, ClusterError> {
        let name = service_account_name(repo);
        let annotations = token_annotations(repo, metadata);

        self.ensure_service_account(&name, &annotations).await?;
        let secret_name = self.create_token_secret(&name, &annotations).await?;
        let token = match self.wait_for_token(&secret_name).await {
            Ok(token) => token,
            Err(e) => {
                // The controller may still fill it in; nobody would hold the token
                self.delete_token_secret(&secret_name).await;
                return Err(e);
            }
        };

        info!(
            "Issued service account token {}/{} for {}",
            self.namespace, secret_name, repo
        );
        Ok(Credential::new(
            token,
            format!("{}/{}", self.namespace, secret_name),
        ))
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenIssuer {
    async fn issue_token(
        &self,
        repo: &RepositoryTarget,
        metadata: &TokenMetadata,
    ) -> Result<Credential, TokenIssuanceError> {
        self.issue(repo, metadata)
            .await
            .map_err(|cause| TokenIssuanceError {
                repo: repo.clone(),
                cause,
            })
    }

    async fn ambient_token(&self) -> Option<Credential> {
        self.ambient.load().await
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

/// Annotations recording which repository, app and user a token is for.
pub fn token_annotations(
    repo: &RepositoryTarget,
    metadata: &TokenMetadata,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        format!("{}/repository", ANNOTATION_PREFIX),
        repo.full_name(),
    );
    annotations.insert(
        format!("{}/repository-id", ANNOTATION_PREFIX),
        repo.id.to_string(),
    );
    annotations.insert(
        format!("{}/created-for-user", ANNOTATION_PREFIX),
        metadata.issued_for_user.clone(),
    );
    if let Some(app) = &metadata.issued_for_app {
        annotations.insert(format!("{}/created-for-app", ANNOTATION_PREFIX), app.clone());
    }
    annotations.insert(
        format!("{}/created-at", ANNOTATION_PREFIX),
        chrono::Utc::now().to_rfc3339(),
    );
    annotations
}

/// DNS-1123 label naming a repository's service account.
///
/// The repository id keeps names unique after sanitizing.
pub fn service_account_name(repo: &RepositoryTarget) -> String {
    let raw = format!("github-{}-{}-{}", repo.id, repo.owner, repo.name).to_lowercase();

    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && name.ends_with('-') {
            continue;
        }
        name.push(c);
    }

    name.truncate(MAX_NAME_LEN);
    name.trim_end_matches('-').to_string()
}
