use openshift_github_connector::{
    cluster::{self, ServiceAccountTokenIssuer, TokenProvider},
    config::AppConfig,
    github::GitHubClient,
    web,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local development settings; absent in-cluster
    let _ = dotenvy::dotenv();

    init_tracing();
    info!(
        "Starting OpenShift GitHub Connector v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::init()?;
    info!("Configuration loaded");

    if config.server.public_url.is_empty() {
        warn!("server.public_url is not set; GitHub App creation will not redirect back");
    }

    let github = GitHubClient::new(&config.github)
        .map_err(|e| anyhow::anyhow!("Failed to build GitHub client: {}", e))?;
    info!("GitHub API: {}", config.github.api_url);

    let connection = cluster::connect(&config.kubernetes).await?;
    let tokens: Arc<dyn TokenProvider> = Arc::new(ServiceAccountTokenIssuer::new(
        connection.client.clone(),
        &config.kubernetes,
    ));
    if tokens.ambient_token().await.is_none() {
        warn!("No ambient cluster token found; the shared credential policy will fail");
    }

    let state = web::AppState::new(
        Arc::new(config.clone()),
        github,
        tokens,
        connection.server_url,
    );
    let app = web::create_router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Web server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Plain text by default; `CONNECTOR_LOG_FORMAT=json` for log collectors.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "openshift_github_connector=debug,tower_http=debug".into());
    let json = std::env::var("CONNECTOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
