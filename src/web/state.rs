use crate::cluster::TokenProvider;
use crate::config::AppConfig;
use crate::github::{AppRegistry, GitHubClient, ManifestStateStore, SharedAppRegistry};
use std::sync::Arc;

/// Application state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub github: GitHubClient,
    pub tokens: Arc<dyn TokenProvider>,
    /// API server URL written into the server secret
    pub cluster_server_url: String,
    pub manifest_states: Arc<ManifestStateStore>,
    pub apps: SharedAppRegistry,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        github: GitHubClient,
        tokens: Arc<dyn TokenProvider>,
        cluster_server_url: impl Into<String>,
    ) -> Self {
        let manifest_states = Arc::new(ManifestStateStore::new(
            config.app_manifest.state_ttl_secs,
            config.app_manifest.max_pending,
        ));

        Self {
            config,
            github,
            tokens,
            cluster_server_url: cluster_server_url.into(),
            manifest_states,
            apps: Arc::new(AppRegistry::new()),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("github", &self.github)
            .field("cluster_server_url", &self.cluster_server_url)
            .field("manifest_states", &self.manifest_states)
            .finish_non_exhaustive()
    }
}
