mod api;

use anyhow::{anyhow, Context};
use api::ConnectorClient;
use clap::{Parser, Subcommand};
use connector_types::{
    CreateSecretsRequest, CredentialPolicy, ProvisioningSummary, RepositoryTarget, SecretNames,
    DEFAULT_SERVER_SECRET_NAME, DEFAULT_TOKEN_SECRET_NAME,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "connector-admin")]
#[command(about = "Admin CLI for the OpenShift GitHub Connector")]
struct Cli {
    /// Connector base URL
    #[arg(long, global = true, env = "CONNECTOR_URL", default_value = "http://localhost:3003")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the connector is up
    Health,
    /// Write cluster credentials into repository secrets
    Provision {
        /// GitHub token used to write the secrets
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,

        /// Repository as owner/name:id, repeatable
        #[arg(long = "repo", required = true, value_parser = parse_repository)]
        repos: Vec<RepositoryTarget>,

        /// fresh: one service account per repository; shared: the connector's own token
        #[arg(long, default_value = "fresh", value_parser = parse_policy)]
        policy: CredentialPolicy,

        #[arg(long, default_value = DEFAULT_SERVER_SECRET_NAME)]
        server_secret: String,

        #[arg(long, default_value = DEFAULT_TOKEN_SECRET_NAME)]
        token_secret: String,

        /// Also write the namespace into a secret of this name
        #[arg(long)]
        namespace_secret: Option<String>,

        /// Print the raw JSON summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = ConnectorClient::new(&cli.server)?;

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            println!("{} (v{})", health.status, health.version);
        }
        Commands::Provision {
            github_token,
            repos,
            policy,
            server_secret,
            token_secret,
            namespace_secret,
            json,
        } => {
            let request = CreateSecretsRequest {
                repositories: repos,
                credential_policy: policy,
                secret_names: Some(SecretNames {
                    cluster_server: server_secret,
                    cluster_token: token_secret,
                    cluster_namespace: namespace_secret,
                }),
            };
            tracing::debug!(
                "Provisioning {} repositories via {}",
                request.repositories.len(),
                cli.server
            );

            let summary = client
                .create_secrets(&github_token, &request)
                .await
                .context("provisioning request failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            if !summary.succeeded {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &ProvisioningSummary) {
    println!("[{:?}] {}", summary.severity, summary.message);
    for success in &summary.successes {
        println!(
            "  ok    {} {} ({})",
            success.repo, success.secret_name, success.credential_ref
        );
    }
    for failure in &summary.failures {
        println!(
            "  FAIL  {} {}: {}",
            failure.repo,
            failure.secret_name.as_deref().unwrap_or("*"),
            failure.error
        );
    }
}

/// Parse `owner/name:id`.
fn parse_repository(s: &str) -> anyhow::Result<RepositoryTarget> {
    let (full_name, id) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected owner/name:id, got {:?}", s))?;
    let (owner, name) = full_name
        .split_once('/')
        .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
        .ok_or_else(|| anyhow!("expected owner/name:id, got {:?}", s))?;
    let id = id
        .parse::<u64>()
        .with_context(|| format!("repository id {:?} is not a number", id))?;
    Ok(RepositoryTarget::new(owner, name, id))
}

fn parse_policy(s: &str) -> anyhow::Result<CredentialPolicy> {
    match s.to_ascii_lowercase().as_str() {
        "fresh" => Ok(CredentialPolicy::Fresh),
        "shared" => Ok(CredentialPolicy::Shared),
        other => Err(anyhow!("unknown credential policy {:?}", other)),
    }
}
