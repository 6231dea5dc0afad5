use config::{Config, ConfigError, Environment, File};
use connector_types::{DEFAULT_SERVER_SECRET_NAME, DEFAULT_TOKEN_SECRET_NAME};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// HTTP listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Externally reachable URL, used for the GitHub App manifest redirect
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    3003
}

fn default_public_url() -> String {
    "http://localhost:3003".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            public_url: default_public_url(),
        }
    }
}

/// GitHub REST API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_github_web_url")]
    pub web_url: String,
    /// Fallback token when a request carries no Authorization header
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_web_url() -> String {
    "https://github.com".to_string()
}

fn default_user_agent() -> String {
    format!("openshift-github-connector/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            web_url: default_github_web_url(),
            token: None,
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Kubernetes cluster configuration
#[derive(Debug, Deserialize, Clone)]
pub struct KubernetesConfig {
    /// Namespace service accounts and their token secrets are created in
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// API server URL written into repositories; the client URL when unset
    #[serde(default)]
    pub cluster_server_url: Option<String>,
    /// Static token used by the shared credential policy
    #[serde(default)]
    pub ambient_token: Option<String>,
    #[serde(default = "default_ambient_token_path")]
    pub ambient_token_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How many times to poll a new token secret before giving up
    #[serde(default = "default_token_poll_attempts")]
    pub token_poll_attempts: u32,
    #[serde(default = "default_token_poll_interval_ms")]
    pub token_poll_interval_ms: u64,
}

fn default_namespace() -> String {
    "github-connector".to_string()
}

fn default_ambient_token_path() -> String {
    "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string()
}

fn default_token_poll_attempts() -> u32 {
    10
}

fn default_token_poll_interval_ms() -> u64 {
    500
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            cluster_server_url: None,
            ambient_token: None,
            ambient_token_path: default_ambient_token_path(),
            timeout_secs: default_timeout_secs(),
            token_poll_attempts: default_token_poll_attempts(),
            token_poll_interval_ms: default_token_poll_interval_ms(),
        }
    }
}

impl KubernetesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn token_poll_interval(&self) -> Duration {
        Duration::from_millis(self.token_poll_interval_ms)
    }
}

/// Secret provisioning settings
#[derive(Debug, Deserialize, Clone)]
pub struct ProvisioningConfig {
    /// Maximum in-flight repositories per phase
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_server_secret_name")]
    pub server_secret_name: String,
    #[serde(default = "default_token_secret_name")]
    pub token_secret_name: String,
    #[serde(default)]
    pub namespace_secret_name: Option<String>,
}

fn default_concurrency() -> usize {
    10
}

fn default_server_secret_name() -> String {
    DEFAULT_SERVER_SECRET_NAME.to_string()
}

fn default_token_secret_name() -> String {
    DEFAULT_TOKEN_SECRET_NAME.to_string()
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            server_secret_name: default_server_secret_name(),
            token_secret_name: default_token_secret_name(),
            namespace_secret_name: None,
        }
    }
}

/// GitHub App manifest hand-off settings
#[derive(Debug, Deserialize, Clone)]
pub struct AppManifestConfig {
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_state_ttl_secs() -> u64 {
    600
}

fn default_max_pending() -> usize {
    1000
}

impl Default for AppManifestConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl_secs(),
            max_pending: default_max_pending(),
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub app_manifest: AppManifestConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. CONNECTOR_GITHUB__TOKEN, CONNECTOR_KUBERNETES__NAMESPACE
            .add_source(
                Environment::with_prefix("CONNECTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Initialize the global config singleton
    pub fn init() -> Result<&'static Self, ConfigError> {
        let config = Self::load()?;
        Ok(CONFIG.get_or_init(|| config))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl GitHubConfig {
    /// Join a path onto the API base URL
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.api_url, path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}
