use crate::error::{AppError, AppResult};
use crate::github::app::{build_manifest, default_app_name, manifest_create_url};
use crate::github::{AppCredentials, PendingAppCreation};
use crate::web::secrets::is_github_name;
use crate::web::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use connector_types::{AppManifestRequest, AppManifestResponse, AppSummary};
use serde::Deserialize;
use tracing::info;

/// Query string GitHub appends when redirecting back after app creation
#[derive(Debug, Deserialize)]
pub struct AppCallbackQuery {
    pub code: String,
    pub state: String,
}

/// Handler: POST /api/github/app/manifest
pub async fn create_manifest(
    State(state): State<AppState>,
    Json(request): Json<AppManifestRequest>,
) -> AppResult<Json<AppManifestResponse>> {
    let app_name = match request.name.map(|n| n.trim().to_string()) {
        Some(name) if !name.is_empty() => name,
        _ => default_app_name(),
    };
    let owner = request
        .owner
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty());
    if let Some(owner) = owner.as_deref().filter(|o| !is_github_name(o)) {
        return Err(AppError::invalid_request(format!(
            "Invalid organization name: {:?}",
            owner
        )));
    }

    let manifest = build_manifest(&app_name, &state.config.server.public_url);
    let token = state
        .manifest_states
        .issue(PendingAppCreation::new(app_name.clone(), owner.clone()));
    let create_url = manifest_create_url(&state.github.config().web_url, owner.as_deref(), &token);

    info!("Issued manifest for GitHub App {}", app_name);
    Ok(Json(AppManifestResponse {
        state: token,
        manifest,
        create_url,
    }))
}

/// Handler: GET /api/github/app/callback
pub async fn app_callback(
    State(state): State<AppState>,
    Query(query): Query<AppCallbackQuery>,
) -> AppResult<Json<AppSummary>> {
    let pending = state
        .manifest_states
        .consume(&query.state)
        .ok_or(AppError::InvalidState)?;

    let credentials: AppCredentials = state.github.convert_app_manifest(&query.code).await?;
    if credentials.name != pending.app_name {
        info!(
            "GitHub App was created as {} (requested {})",
            credentials.name, pending.app_name
        );
    }

    let summary = state.apps.register(credentials).await;
    info!("Registered GitHub App {} (id {})", summary.slug, summary.id);
    Ok(Json(summary))
}

/// Handler: GET /api/github/app
pub async fn get_app(State(state): State<AppState>) -> AppResult<Json<AppSummary>> {
    state
        .apps
        .summary()
        .await
        .map(Json)
        .ok_or(AppError::AppNotConfigured)
}
