//! Kubernetes cluster access.

pub mod tokens;

pub use tokens::{
    AmbientToken, Credential, ServiceAccountTokenIssuer, TokenIssuanceError, TokenMetadata,
    TokenProvider,
};

use crate::config::KubernetesConfig;
use thiserror::Error;
use tracing::info;

/// Cluster errors
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Failed to load Kubernetes configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Token secret {secret} was not populated after {attempts} attempts")]
    TokenNotPopulated { secret: String, attempts: u32 },

    #[error("Token in secret {0} is not valid UTF-8")]
    InvalidToken(String),

    #[error("Created resource has no name")]
    MissingName,
}

/// A connected cluster client and the API server URL written into repositories.
#[derive(Clone)]
pub struct ClusterConnection {
    pub client: kube::Client,
    pub server_url: String,
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("server_url", &self.server_url)
            .finish_non_exhaustive()
    }
}

/// Connect using in-cluster config or the local kubeconfig.
pub async fn connect(config: &KubernetesConfig) -> Result<ClusterConnection, ClusterError> {
    let mut kube_config = kube::Config::infer().await?;
    kube_config.connect_timeout = Some(config.timeout());
    kube_config.read_timeout = Some(config.timeout());
    kube_config.write_timeout = Some(config.timeout());

    let server_url = config
        .cluster_server_url
        .clone()
        .unwrap_or_else(|| kube_config.cluster_url.to_string())
        .trim_end_matches('/')
        .to_string();

    let client = kube::Client::try_from(kube_config)?;
    info!("Connected to Kubernetes API at {}", server_url);

    Ok(ClusterConnection { client, server_url })
}
