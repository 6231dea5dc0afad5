//! Wire types shared by the connector server and the admin CLI.
//!
//! Everything here is plain serde data: requests the CLI sends, and the
//! provisioning summary the server returns. JSON field names are camelCase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default Actions secret name holding the cluster API server URL.
pub const DEFAULT_SERVER_SECRET_NAME: &str = "OPENSHIFT_SERVER";
/// Default Actions secret name holding the service account token.
pub const DEFAULT_TOKEN_SECRET_NAME: &str = "OPENSHIFT_TOKEN";

/// One destination repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryTarget {
    pub owner: String,
    pub name: String,
    pub id: u64,
}

impl RepositoryTarget {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, id: u64) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            id,
        }
    }

    /// `owner/name`, the key outcomes are sorted by.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// How credentials are obtained for a provisioning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialPolicy {
    /// Mint a new service account token per repository.
    #[default]
    Fresh,
    /// Reuse the single ambient credential for every repository.
    Shared,
}

impl fmt::Display for CredentialPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => f.write_str("fresh"),
            Self::Shared => f.write_str("shared"),
        }
    }
}

/// Names of the Actions secrets written into each repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretNames {
    pub cluster_server: String,
    pub cluster_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_namespace: Option<String>,
}

impl Default for SecretNames {
    fn default() -> Self {
        Self {
            cluster_server: DEFAULT_SERVER_SECRET_NAME.to_string(),
            cluster_token: DEFAULT_TOKEN_SECRET_NAME.to_string(),
            cluster_namespace: None,
        }
    }
}

/// Body of `POST /api/secrets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecretsRequest {
    pub repositories: Vec<RepositoryTarget>,
    #[serde(default)]
    pub credential_policy: CredentialPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_names: Option<SecretNames>,
}

/// A secret that was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSuccess {
    pub repo: RepositoryTarget,
    pub secret_name: String,
    /// Reference to the credential embedded in the secret, e.g. `namespace/secret`.
    pub credential_ref: String,
}

/// A failed secret write, or a repository-level failure when `secret_name` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretFailure {
    pub repo: RepositoryTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    pub error: String,
}

impl SecretFailure {
    pub fn is_repository_level(&self) -> bool {
        self.secret_name.is_none()
    }
}

/// Result of one provisioning unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProvisioningOutcome {
    Success(SecretSuccess),
    Failure(SecretFailure),
}

impl ProvisioningOutcome {
    pub fn repo(&self) -> &RepositoryTarget {
        match self {
            Self::Success(s) => &s.repo,
            Self::Failure(f) => &f.repo,
        }
    }
}

/// Display tier of a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Danger,
}

/// Aggregated result of a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningSummary {
    pub successes: Vec<SecretSuccess>,
    pub failures: Vec<SecretFailure>,
    pub succeeded: bool,
    pub message: String,
    pub severity: Severity,
}

/// Body of `POST /api/github/app/manifest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifestRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Organization to create the app under; personal account when absent.
    #[serde(default)]
    pub owner: Option<String>,
}

/// Manifest hand-off returned to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifestResponse {
    pub state: String,
    pub manifest: serde_json::Value,
    pub create_url: String,
}

/// Public view of the created GitHub App.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub id: u64,
    pub slug: String,
    pub name: String,
    pub html_url: String,
    pub owner_login: Option<String>,
}

/// Health endpoint body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
