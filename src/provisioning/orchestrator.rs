use crate::cluster::{Credential, TokenMetadata, TokenProvider};
use crate::github::{RepoSecretStore, SealingKey};
use crate::provisioning::summary::summarize;
use connector_types::{
    CredentialPolicy, ProvisioningOutcome, ProvisioningSummary, RepositoryTarget, SecretFailure,
    SecretSuccess,
};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

/// Default cap on repositories handled at once in each phase.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Caller contract violations. Operational failures never surface here.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("At least one repository is required")]
    NoRepositories,
}

/// A secret to write into a repository.
#[derive(Clone)]
pub struct SecretSpec {
    pub name: String,
    pub value: String,
}

impl SecretSpec {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Drop for SecretSpec {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl std::fmt::Debug for SecretSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSpec")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Writes secrets into many repositories, tolerating per-repository and
/// per-secret failures.
///
/// Phases:
/// 1. one credential per repository (or one shared credential)
/// 2. per repository: public key, then every secret concurrently
/// 3. outcomes folded into a sorted [`ProvisioningSummary`]
#[derive(Clone)]
pub struct SecretProvisioner {
    tokens: Arc<dyn TokenProvider>,
    secrets: Arc<dyn RepoSecretStore>,
    concurrency: usize,
}

impl std::fmt::Debug for SecretProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretProvisioner")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl SecretProvisioner {
    pub fn new(tokens: Arc<dyn TokenProvider>, secrets: Arc<dyn RepoSecretStore>) -> Self {
        Self {
            tokens,
            secrets,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Provision secrets into every repository in `repos`.
    ///
    /// `secret_specs` decides which secrets to write once a repository's
    /// credential is known. Only an empty repository list is an error; every
    /// other failure is reported in the summary.
    pub async fn provision<F>(
        &self,
        repos: &[RepositoryTarget],
        policy: CredentialPolicy,
        metadata: &TokenMetadata,
        secret_specs: F,
    ) -> Result<ProvisioningSummary, ProvisionError>
    where
        F: Fn(&Credential) -> Vec<SecretSpec> + Sync,
    {
        if repos.is_empty() {
            return Err(ProvisionError::NoRepositories);
        }

        let repos = dedup_repositories(repos);
        info!(
            "Provisioning secrets into {} repositories (policy={})",
            repos.len(),
            policy
        );

        let mut outcomes = Vec::new();
        let credentialed = match policy {
            CredentialPolicy::Fresh => {
                self.issue_credentials(&repos, metadata, &mut outcomes)
                    .await
            }
            CredentialPolicy::Shared => match self.tokens.ambient_token().await {
                Some(credential) => repos
                    .iter()
                    .map(|repo| (*repo, credential.clone()))
                    .collect(),
                None => {
                    warn!("No ambient credential available; skipping all repositories");
                    outcomes.extend(repos.iter().map(|repo| {
                        repository_failure(
                            repo,
                            "No ambient cluster credential is available to share",
                        )
                    }));
                    Vec::new()
                }
            },
        };

        let secret_specs = &secret_specs;
        let tasks: Vec<_> = credentialed
            .into_iter()
            .map(|(repo, credential)| self.provision_repository(repo, credential, secret_specs))
            .collect();
        let per_repository: Vec<Vec<ProvisioningOutcome>> = stream::iter(tasks)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.extend(per_repository.into_iter().flatten());

        let summary = summarize(outcomes);
        info!(
            "Provisioning finished: {} succeeded, {} failed",
            summary.successes.len(),
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Issue one credential per repository. Failed repositories get a
    /// repository-level failure and are left out of the result.
    async fn issue_credentials<'r>(
        &self,
        repos: &[&'r RepositoryTarget],
        metadata: &TokenMetadata,
        outcomes: &mut Vec<ProvisioningOutcome>,
    ) -> Vec<(&'r RepositoryTarget, Credential)> {
        let tasks: Vec<_> = repos
            .iter()
            .map(|repo| async move { (*repo, self.tokens.issue_token(repo, metadata).await) })
            .collect();
        let results: Vec<_> = stream::iter(tasks)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut credentialed = Vec::with_capacity(results.len());
        for (repo, result) in results {
            match result {
                Ok(credential) => credentialed.push((repo, credential)),
                Err(e) => {
                    warn!("Credential issuance failed for {}: {}", repo, e);
                    outcomes.push(repository_failure(repo, e.to_string()));
                }
            }
        }
        credentialed
    }

    async fn provision_repository<F>(
        &self,
        repo: &RepositoryTarget,
        credential: Credential,
        secret_specs: &F,
    ) -> Vec<ProvisioningOutcome>
    where
        F: Fn(&Credential) -> Vec<SecretSpec> + Sync,
    {
        let public_key = match self.secrets.public_key(repo).await {
            Ok(key) => key,
            Err(e) => {
                warn!("Public key fetch failed for {}: {}", repo, e);
                return vec![repository_failure(repo, e.to_string())];
            }
        };

        let sealing_key = match SealingKey::parse(&public_key) {
            Ok(key) => key,
            Err(e) => {
                warn!("Public key for {} is unusable: {}", repo, e);
                return vec![repository_failure(repo, e.to_string())];
            }
        };

        let specs = secret_specs(&credential);
        if specs.is_empty() {
            return vec![repository_failure(repo, "No secrets were requested")];
        }
        debug!(
            "Writing {} secrets to {} with key {}",
            specs.len(),
            repo,
            sealing_key.key_id()
        );

        let writes = specs
            .iter()
            .map(|spec| self.write_secret(repo, &sealing_key, spec, &credential.reference_id));
        futures::future::join_all(writes).await
    }

    async fn write_secret(
        &self,
        repo: &RepositoryTarget,
        key: &SealingKey,
        spec: &SecretSpec,
        credential_ref: &str,
    ) -> ProvisioningOutcome {
        let result = match key.seal(&spec.value) {
            Ok(encrypted) => self
                .secrets
                .put_secret(repo, &spec.name, &encrypted)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => {
                debug!("Wrote secret {} to {}", spec.name, repo);
                ProvisioningOutcome::Success(SecretSuccess {
                    repo: repo.clone(),
                    secret_name: spec.name.clone(),
                    credential_ref: credential_ref.to_string(),
                })
            }
            Err(error) => {
                warn!("Writing secret {} to {} failed: {}", spec.name, repo, error);
                ProvisioningOutcome::Failure(SecretFailure {
                    repo: repo.clone(),
                    secret_name: Some(spec.name.clone()),
                    error,
                })
            }
        }
    }
}

fn repository_failure(repo: &RepositoryTarget, error: impl Into<String>) -> ProvisioningOutcome {
    ProvisioningOutcome::Failure(SecretFailure {
        repo: repo.clone(),
        secret_name: None,
        error: error.into(),
    })
}

/// Drop repeated repositories so each gets exactly one credential.
///
/// GitHub addresses secrets by `owner/name` and matches it case-insensitively,
/// so that is the key; the first occurrence wins whatever its id.
fn dedup_repositories(repos: &[RepositoryTarget]) -> Vec<&RepositoryTarget> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(repos.len());
    for repo in repos {
        if seen.insert(repo.full_name().to_lowercase()) {
            unique.push(repo);
        } else {
            warn!("Ignoring duplicate repository {} (id {})", repo, repo.id);
        }
    }
    unique
}
