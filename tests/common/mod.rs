//! In-memory stand-ins for the cluster and GitHub collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use connector_types::RepositoryTarget;
use crypto_box::SecretKey;
use openshift_github_connector::cluster::{
    ClusterError, Credential, TokenIssuanceError, TokenMetadata, TokenProvider,
};
use openshift_github_connector::github::{
    EncryptedSecret, GitHubError, GitHubResult, RepoPublicKey, RepoSecretStore,
};
use openshift_github_connector::provisioning::SecretSpec;
use rand::rngs::OsRng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn repo(owner: &str, name: &str, id: u64) -> RepositoryTarget {
    RepositoryTarget::new(owner, name, id)
}

/// Two secrets per repository, the usual server URL + token pair.
pub fn two_secrets(credential: &Credential) -> Vec<SecretSpec> {
    vec![
        SecretSpec::new("OPENSHIFT_SERVER", "https://api.cluster.example:6443"),
        SecretSpec::new("OPENSHIFT_TOKEN", credential.value.clone()),
    ]
}

pub fn metadata() -> TokenMetadata {
    TokenMetadata {
        issued_for_app: Some("openshift-connector-test".to_string()),
        issued_for_user: "octocat".to_string(),
    }
}

/// Tracks how many calls overlap.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Token provider issuing `token-for-{owner/name}` credentials.
#[derive(Default)]
pub struct FakeTokens {
    failing: HashSet<String>,
    ambient: Option<String>,
    delays: HashMap<String, Duration>,
    issued: Mutex<Vec<String>>,
    pub issue_calls: AtomicUsize,
    pub ambient_calls: AtomicUsize,
}

impl FakeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, full_name: &str) -> Self {
        self.failing.insert(full_name.to_string());
        self
    }

    pub fn with_ambient(mut self, token: &str) -> Self {
        self.ambient = Some(token.to_string());
        self
    }

    pub fn with_delay(mut self, full_name: &str, delay: Duration) -> Self {
        self.delays.insert(full_name.to_string(), delay);
        self
    }

    /// Repositories a credential was issued for, in call order.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn issue_token(
        &self,
        repo: &RepositoryTarget,
        _metadata: &TokenMetadata,
    ) -> Result<Credential, TokenIssuanceError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        let full_name = repo.full_name();
        self.issued.lock().unwrap().push(full_name.clone());

        if let Some(delay) = self.delays.get(&full_name) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&full_name) {
            return Err(TokenIssuanceError {
                repo: repo.clone(),
                cause: ClusterError::TokenNotPopulated {
                    secret: format!("github-{}-token", repo.id),
                    attempts: 10,
                },
            });
        }
        Ok(Credential::new(
            format!("token-for-{}", full_name),
            format!("github-connector/github-{}-token", repo.id),
        ))
    }

    async fn ambient_token(&self) -> Option<Credential> {
        self.ambient_calls.fetch_add(1, Ordering::SeqCst);
        self.ambient
            .as_ref()
            .map(|token| Credential::new(token.clone(), "config:kubernetes.ambient_token"))
    }
}

/// A secret the fake store accepted.
#[derive(Debug, Clone)]
pub struct StoredSecret {
    pub repo: String,
    pub name: String,
    pub secret: EncryptedSecret,
}

/// Secret store backed by one real Curve25519 keypair, so written values can
/// be decrypted and checked.
pub struct FakeSecretStore {
    secret_key: SecretKey,
    key_unavailable: HashSet<String>,
    malformed_key: HashSet<String>,
    rejected_writes: HashSet<(String, String)>,
    delays: HashMap<String, Duration>,
    delay_all: Option<Duration>,
    stored: Mutex<Vec<StoredSecret>>,
    pub key_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
    pub in_flight: InFlight,
}

impl Default for FakeSecretStore {
    fn default() -> Self {
        Self {
            secret_key: SecretKey::generate(&mut OsRng),
            key_unavailable: HashSet::new(),
            malformed_key: HashSet::new(),
            rejected_writes: HashSet::new(),
            delays: HashMap::new(),
            delay_all: None,
            stored: Mutex::new(Vec::new()),
            key_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            in_flight: InFlight::default(),
        }
    }
}

impl FakeSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_unavailable_for(mut self, full_name: &str) -> Self {
        self.key_unavailable.insert(full_name.to_string());
        self
    }

    pub fn malformed_key_for(mut self, full_name: &str) -> Self {
        self.malformed_key.insert(full_name.to_string());
        self
    }

    pub fn rejecting(mut self, full_name: &str, secret: &str) -> Self {
        self.rejected_writes
            .insert((full_name.to_string(), secret.to_string()));
        self
    }

    pub fn with_delay(mut self, full_name: &str, delay: Duration) -> Self {
        self.delays.insert(full_name.to_string(), delay);
        self
    }

    pub fn with_delay_all(mut self, delay: Duration) -> Self {
        self.delay_all = Some(delay);
        self
    }

    pub fn stored(&self) -> Vec<StoredSecret> {
        self.stored.lock().unwrap().clone()
    }

    pub fn key_calls(&self) -> usize {
        self.key_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Decrypt a stored value with the private half of the repository key.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> String {
        let ciphertext = BASE64.decode(&secret.encrypted_value).unwrap();
        let plaintext = self.secret_key.unseal(&ciphertext).unwrap();
        String::from_utf8(plaintext).unwrap()
    }

    /// Decrypted value of `name` in `full_name`, if it was written.
    pub fn value_of(&self, full_name: &str, name: &str) -> Option<String> {
        self.stored()
            .iter()
            .find(|s| s.repo == full_name && s.name == name)
            .map(|s| self.decrypt(&s.secret))
    }
}

#[async_trait]
impl RepoSecretStore for FakeSecretStore {
    async fn public_key(&self, repo: &RepositoryTarget) -> GitHubResult<RepoPublicKey> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        let full_name = repo.full_name();

        self.in_flight.enter();
        let delay = self.delays.get(&full_name).copied().or(self.delay_all);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.exit();

        if self.key_unavailable.contains(&full_name) {
            return Err(GitHubError::Api {
                status: 404,
                message: "Not Found".to_string(),
            });
        }
        let key = if self.malformed_key.contains(&full_name) {
            BASE64.encode([7u8; 16])
        } else {
            BASE64.encode(self.secret_key.public_key().as_bytes())
        };
        Ok(RepoPublicKey {
            key_id: format!("key-{}", repo.id),
            key,
        })
    }

    async fn put_secret(
        &self,
        repo: &RepositoryTarget,
        name: &str,
        secret: &EncryptedSecret,
    ) -> GitHubResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let full_name = repo.full_name();

        if self
            .rejected_writes
            .contains(&(full_name.clone(), name.to_string()))
        {
            return Err(GitHubError::Api {
                status: 403,
                message: "Resource not accessible by integration".to_string(),
            });
        }
        self.stored.lock().unwrap().push(StoredSecret {
            repo: full_name,
            name: name.to_string(),
            secret: secret.clone(),
        });
        Ok(())
    }
}
