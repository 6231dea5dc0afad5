use crate::web::app::{app_callback, create_manifest, get_app};
use crate::web::secrets::create_secrets;
use crate::web::state::AppState;
use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use connector_types::HealthResponse;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create the web router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/secrets", post(create_secrets))
        .route("/api/github/app", get(get_app))
        .route("/api/github/app/manifest", post(create_manifest))
        .route("/api/github/app/callback", get(app_callback))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
