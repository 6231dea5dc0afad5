use crate::cluster::{Credential, TokenMetadata};
use crate::error::{AppError, AppResult};
use crate::github::RepoSecretStore;
use crate::provisioning::{ProvisionError, SecretProvisioner, SecretSpec};
use crate::web::state::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use connector_types::{CreateSecretsRequest, ProvisioningSummary, RepositoryTarget, SecretNames};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Handler: POST /api/secrets
///
/// Writes the cluster server URL and a cluster token into every requested
/// repository. Partial failures still return 200 with the summary.
pub async fn create_secrets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSecretsRequest>,
) -> AppResult<Json<ProvisioningSummary>> {
    if request.repositories.is_empty() {
        return Err(ProvisionError::NoRepositories.into());
    }
    for repo in &request.repositories {
        validate_repository(repo)?;
    }

    let names = request.secret_names.clone().unwrap_or_else(|| SecretNames {
        cluster_server: state.config.provisioning.server_secret_name.clone(),
        cluster_token: state.config.provisioning.token_secret_name.clone(),
        cluster_namespace: state.config.provisioning.namespace_secret_name.clone(),
    });
    validate_secret_names(&names)?;

    let token = bearer_token(&headers)
        .or_else(|| state.config.github.token.clone())
        .ok_or(AppError::AuthRequired)?;
    let github = state.github.authenticated(token);
    let user = github.current_user().await?;

    let metadata = TokenMetadata {
        issued_for_app: state.apps.slug().await,
        issued_for_user: user.login,
    };
    info!(
        "{} requested {} secrets for {} repositories",
        metadata.issued_for_user,
        request.credential_policy,
        request.repositories.len()
    );

    let secrets: Arc<dyn RepoSecretStore> = Arc::new(github);
    let provisioner = SecretProvisioner::new(state.tokens.clone(), secrets)
        .with_concurrency(state.config.provisioning.concurrency);

    let server_url = state.cluster_server_url.clone();
    let namespace = state.config.kubernetes.namespace.clone();
    let summary = provisioner
        .provision(
            &request.repositories,
            request.credential_policy,
            &metadata,
            |credential: &Credential| cluster_secrets(&names, &server_url, &namespace, credential),
        )
        .await?;

    Ok(Json(summary))
}

/// The secrets a workflow needs to log in to the cluster.
pub fn cluster_secrets(
    names: &SecretNames,
    server_url: &str,
    namespace: &str,
    credential: &Credential,
) -> Vec<SecretSpec> {
    let mut specs = vec![
        SecretSpec::new(names.cluster_server.clone(), server_url),
        SecretSpec::new(names.cluster_token.clone(), credential.value.clone()),
    ];
    if let Some(name) = &names.cluster_namespace {
        specs.push(SecretSpec::new(name.clone(), namespace));
    }
    specs
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
}

/// Account and repository names end up in URL paths, so only GitHub's own
/// charset is allowed.
pub(crate) fn is_github_name(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn validate_repository(repo: &RepositoryTarget) -> AppResult<()> {
    if is_github_name(&repo.owner) && is_github_name(&repo.name) {
        Ok(())
    } else {
        Err(AppError::invalid_request(format!(
            "Invalid repository name: {}",
            repo
        )))
    }
}

/// GitHub secret names: alphanumerics and underscores, no leading digit,
/// no `GITHUB_` prefix.
fn validate_secret_names(names: &SecretNames) -> AppResult<()> {
    let mut seen = HashSet::new();
    let all = [Some(&names.cluster_server), Some(&names.cluster_token), names.cluster_namespace.as_ref()];

    for name in all.into_iter().flatten() {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && !name.to_ascii_uppercase().starts_with("GITHUB_");
        if !valid {
            return Err(AppError::invalid_request(format!(
                "Invalid secret name: {:?}",
                name
            )));
        }
        if !seen.insert(name.to_ascii_uppercase()) {
            return Err(AppError::invalid_request(format!(
                "Duplicate secret name: {}",
                name
            )));
        }
    }
    Ok(())
}
