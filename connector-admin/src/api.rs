use anyhow::{anyhow, Context};
use connector_types::{CreateSecretsRequest, HealthResponse, ProvisioningSummary};
use serde::de::DeserializeOwned;

/// Client for a running connector's HTTP API.
pub struct ConnectorClient {
    http: reqwest::Client,
    base_url: String,
}

impl ConnectorClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn health(&self) -> anyhow::Result<HealthResponse> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .with_context(|| format!("connector at {} is unreachable", self.base_url))?;
        decode(resp).await
    }

    pub async fn create_secrets(
        &self,
        github_token: &str,
        request: &CreateSecretsRequest,
    ) -> anyhow::Result<ProvisioningSummary> {
        let resp = self
            .http
            .post(format!("{}/api/secrets", self.base_url))
            .bearer_auth(github_token)
            .json(request)
            .send()
            .await
            .with_context(|| format!("connector at {} is unreachable", self.base_url))?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        return Err(anyhow!("connector returned {}: {}", status, message));
    }
    Ok(resp.json().await?)
}
