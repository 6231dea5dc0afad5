//! GitHub App creation via the manifest flow.
//!
//! The browser posts a manifest to GitHub together with a `state` token minted
//! here. GitHub redirects back with a one-time `code` and the same `state`;
//! the state must be known, unexpired and unused before the code is exchanged.
//! The resulting app credentials are held only in memory.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use connector_types::AppSummary;
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use zeroize::Zeroize;

/// A manifest hand-off waiting for GitHub's redirect
#[derive(Clone, Debug)]
pub struct PendingAppCreation {
    pub app_name: String,
    pub owner: Option<String>,
    pub created_at: Instant,
}

impl PendingAppCreation {
    pub fn new(app_name: String, owner: Option<String>) -> Self {
        Self {
            app_name,
            owner,
            created_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Short-lived state tokens for the manifest flow
pub struct ManifestStateStore {
    pending: DashMap<String, PendingAppCreation>,
    ttl: Duration,
    max_pending: usize,
}

impl ManifestStateStore {
    pub fn new(ttl_secs: u64, max_pending: usize) -> Self {
        Self {
            pending: DashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
            max_pending,
        }
    }

    /// Mint a state token for a new pending creation.
    pub fn issue(&self, pending: PendingAppCreation) -> String {
        if self.pending.len() >= self.max_pending {
            self.evict_expired();
        }

        // Still full: drop the oldest entry
        if self.pending.len() >= self.max_pending {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|r| r.value().created_at)
                .map(|r| r.key().clone());
            if let Some(key) = oldest {
                self.pending.remove(&key);
            }
        }

        let state = generate_state_token();
        self.pending.insert(state.clone(), pending);
        state
    }

    /// Take a state token. Returns `None` for unknown, reused or expired tokens.
    pub fn consume(&self, state: &str) -> Option<PendingAppCreation> {
        let (_, pending) = self.pending.remove(state)?;
        if pending.is_expired(self.ttl) {
            None
        } else {
            Some(pending)
        }
    }

    pub fn evict_expired(&self) {
        self.pending.retain(|_, pending| !pending.is_expired(self.ttl));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl std::fmt::Debug for ManifestStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStateStore")
            .field("pending", &self.pending.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the manifest GitHub creates the app from.
pub fn build_manifest(app_name: &str, public_url: &str) -> serde_json::Value {
    let base = public_url.trim_end_matches('/');
    json!({
        "name": app_name,
        "url": base,
        "redirect_url": format!("{}/api/github/app/callback", base),
        "callback_urls": [base],
        "public": false,
        "hook_attributes": {
            "url": format!("{}/api/github/webhook", base),
            "active": false
        },
        "default_permissions": {
            "actions": "write",
            "secrets": "write",
            "workflows": "write",
            "metadata": "read"
        },
        "default_events": []
    })
}

/// GitHub page the manifest form is posted to.
pub fn manifest_create_url(web_url: &str, owner: Option<&str>, state: &str) -> String {
    let base = web_url.trim_end_matches('/');
    match owner {
        Some(org) => format!(
            "{}/organizations/{}/settings/apps/new?state={}",
            base, org, state
        ),
        None => format!("{}/settings/apps/new?state={}", base, state),
    }
}

/// Default app name; app names are global on GitHub so a suffix is appended.
pub fn default_app_name() -> String {
    let mut suffix = [0u8; 4];
    OsRng.fill_bytes(&mut suffix);
    let hex: String = suffix.iter().map(|b| format!("{:02x}", b)).collect();
    format!("openshift-connector-{}", hex)
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppOwner {
    pub login: String,
}

/// Credentials returned by the manifest conversion.
#[derive(Clone, Deserialize)]
pub struct AppCredentials {
    pub id: u64,
    pub slug: String,
    pub name: String,
    pub html_url: String,
    #[serde(default)]
    pub owner: Option<AppOwner>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    pub pem: String,
}

impl AppCredentials {
    pub fn summary(&self) -> AppSummary {
        AppSummary {
            id: self.id,
            slug: self.slug.clone(),
            name: self.name.clone(),
            html_url: self.html_url.clone(),
            owner_login: self.owner.as_ref().map(|o| o.login.clone()),
        }
    }
}

impl Drop for AppCredentials {
    fn drop(&mut self) {
        self.client_secret.zeroize();
        self.pem.zeroize();
        if let Some(ref mut secret) = self.webhook_secret {
            secret.zeroize();
        }
    }
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("id", &self.id)
            .field("slug", &self.slug)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// The GitHub App this connector created, if any.
#[derive(Default)]
pub struct AppRegistry {
    app: RwLock<Option<AppCredentials>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store newly created app credentials, replacing any previous app.
    pub async fn register(&self, credentials: AppCredentials) -> AppSummary {
        let summary = credentials.summary();
        *self.app.write().await = Some(credentials);
        summary
    }

    pub async fn summary(&self) -> Option<AppSummary> {
        self.app.read().await.as_ref().map(AppCredentials::summary)
    }

    pub async fn slug(&self) -> Option<String> {
        self.app.read().await.as_ref().map(|a| a.slug.clone())
    }
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("app", &"<check async>")
            .finish_non_exhaustive()
    }
}

/// Shared registry handle
pub type SharedAppRegistry = Arc<AppRegistry>;
