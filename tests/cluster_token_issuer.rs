//! Runs the service account token issuer against a local mock of the
//! Kubernetes core/v1 API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use connector_types::RepositoryTarget;
use openshift_github_connector::cluster::{
    ClusterError, ServiceAccountTokenIssuer, TokenMetadata, TokenProvider,
};
use openshift_github_connector::config::KubernetesConfig;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const NAMESPACE: &str = "github-connector";
const NAME_SUFFIX: &str = "x7k2p";

/// Mock API server holding ServiceAccounts and Secrets in memory.
#[derive(Default)]
struct MockCluster {
    service_accounts: Mutex<HashMap<String, Value>>,
    secrets: Mutex<HashMap<String, Value>>,
    polls: Mutex<HashMap<String, u32>>,
    deleted: Mutex<Vec<String>>,
    sa_creates: AtomicUsize,
    /// Poll on which the token controller fills in the token; never when `None`
    populate_on_poll: Option<u32>,
    /// Answer secret reads with a server error
    fail_secret_reads: bool,
}

impl MockCluster {
    fn secret_names(&self) -> Vec<String> {
        self.secrets.lock().unwrap().keys().cloned().collect()
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn polls(&self, name: &str) -> u32 {
        self.polls.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

fn status(code: StatusCode, reason: &str, message: &str) -> axum::response::Response {
    (
        code,
        Json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code.as_u16()
        })),
    )
        .into_response()
}

async fn get_service_account(
    State(mock): State<Arc<MockCluster>>,
    Path((_ns, name)): Path<(String, String)>,
) -> axum::response::Response {
    match mock.service_accounts.lock().unwrap().get(&name) {
        Some(sa) => Json(sa.clone()).into_response(),
        None => status(StatusCode::NOT_FOUND, "NotFound", "serviceaccounts not found"),
    }
}

async fn create_service_account(
    State(mock): State<Arc<MockCluster>>,
    Path(ns): Path<String>,
    Json(mut body): Json<Value>,
) -> axum::response::Response {
    mock.sa_creates.fetch_add(1, Ordering::SeqCst);
    body["metadata"]["namespace"] = json!(ns);
    let name = body["metadata"]["name"].as_str().unwrap_or_default().to_string();
    mock.service_accounts
        .lock()
        .unwrap()
        .insert(name, body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn create_secret(
    State(mock): State<Arc<MockCluster>>,
    Path(ns): Path<String>,
    Json(mut body): Json<Value>,
) -> axum::response::Response {
    let prefix = body["metadata"]["generateName"].as_str().unwrap_or_default();
    let name = format!("{}{}", prefix, NAME_SUFFIX);
    body["metadata"]["name"] = json!(name);
    body["metadata"]["namespace"] = json!(ns);
    mock.secrets.lock().unwrap().insert(name, body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_secret(
    State(mock): State<Arc<MockCluster>>,
    Path((_ns, name)): Path<(String, String)>,
) -> axum::response::Response {
    if mock.fail_secret_reads {
        return status(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "etcd unavailable");
    }
    let poll = {
        let mut polls = mock.polls.lock().unwrap();
        let count = polls.entry(name.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let mut secrets = mock.secrets.lock().unwrap();
    let Some(secret) = secrets.get_mut(&name) else {
        return status(StatusCode::NOT_FOUND, "NotFound", "secrets not found");
    };
    if mock.populate_on_poll.is_some_and(|n| poll >= n) {
        secret["data"] = json!({ "token": BASE64.encode(format!("sa-token-{}", name)) });
    }
    Json(secret.clone()).into_response()
}

async fn delete_secret(
    State(mock): State<Arc<MockCluster>>,
    Path((_ns, name)): Path<(String, String)>,
) -> axum::response::Response {
    mock.deleted.lock().unwrap().push(name.clone());
    match mock.secrets.lock().unwrap().remove(&name) {
        Some(secret) => Json(secret).into_response(),
        None => status(StatusCode::NOT_FOUND, "NotFound", "secrets not found"),
    }
}

async fn start(mock: MockCluster) -> (Arc<MockCluster>, ServiceAccountTokenIssuer) {
    let mock = Arc::new(mock);
    let router = Router::new()
        .route(
            "/api/v1/namespaces/{ns}/serviceaccounts/{name}",
            get(get_service_account),
        )
        .route(
            "/api/v1/namespaces/{ns}/serviceaccounts",
            post(create_service_account),
        )
        .route(
            "/api/v1/namespaces/{ns}/secrets/{name}",
            get(get_secret).delete(delete_secret),
        )
        .route("/api/v1/namespaces/{ns}/secrets", post(create_secret))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let kube_config = kube::Config::new(format!("http://{}", addr).parse().unwrap());
    let client = kube::Client::try_from(kube_config).unwrap();
    let config = KubernetesConfig {
        namespace: NAMESPACE.to_string(),
        ambient_token_path: "/nonexistent/token".to_string(),
        token_poll_attempts: 3,
        token_poll_interval_ms: 5,
        ..KubernetesConfig::default()
    };
    (mock, ServiceAccountTokenIssuer::new(client, &config))
}

fn metadata() -> TokenMetadata {
    TokenMetadata {
        issued_for_app: None,
        issued_for_user: "octocat".to_string(),
    }
}

#[tokio::test]
async fn creates_service_account_and_waits_for_token() {
    let (mock, issuer) = start(MockCluster {
        populate_on_poll: Some(3),
        ..MockCluster::default()
    })
    .await;
    let repo = RepositoryTarget::new("acme", "api", 42);

    let credential = issuer.issue_token(&repo, &metadata()).await.unwrap();

    let secret_name = format!("github-42-acme-api-token-{}", NAME_SUFFIX);
    assert_eq!(credential.value, format!("sa-token-{}", secret_name));
    assert_eq!(
        credential.reference_id,
        format!("{}/{}", NAMESPACE, secret_name)
    );
    assert_eq!(mock.polls(&secret_name), 3);
    assert_eq!(mock.sa_creates.load(Ordering::SeqCst), 1);
    assert!(mock.deleted().is_empty());

    let accounts = mock.service_accounts.lock().unwrap();
    let sa = &accounts["github-42-acme-api"];
    assert_eq!(
        sa["metadata"]["annotations"]["github-connector.openshift.io/repository"],
        "acme/api"
    );
    drop(accounts);

    let secrets = mock.secrets.lock().unwrap();
    let secret = &secrets[&secret_name];
    assert_eq!(secret["type"], "kubernetes.io/service-account-token");
    assert_eq!(
        secret["metadata"]["annotations"]["kubernetes.io/service-account.name"],
        "github-42-acme-api"
    );
}

#[tokio::test]
async fn reuses_existing_service_account() {
    let mock = MockCluster {
        populate_on_poll: Some(1),
        ..MockCluster::default()
    };
    mock.service_accounts.lock().unwrap().insert(
        "github-7-acme-web".to_string(),
        json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": "github-7-acme-web", "namespace": NAMESPACE }
        }),
    );
    let (mock, issuer) = start(mock).await;

    let credential = issuer
        .issue_token(&RepositoryTarget::new("acme", "web", 7), &metadata())
        .await
        .unwrap();

    assert!(credential.value.starts_with("sa-token-github-7-acme-web-token-"));
    assert_eq!(mock.sa_creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unpopulated_token_secret_is_deleted() {
    let (mock, issuer) = start(MockCluster::default()).await;
    let repo = RepositoryTarget::new("acme", "api", 42);

    let err = issuer.issue_token(&repo, &metadata()).await.unwrap_err();

    assert_eq!(err.repo, repo);
    assert!(matches!(
        err.cause,
        ClusterError::TokenNotPopulated { attempts: 3, .. }
    ));
    let secret_name = format!("github-42-acme-api-token-{}", NAME_SUFFIX);
    assert_eq!(mock.polls(&secret_name), 3);
    assert_eq!(mock.deleted(), vec![secret_name]);
    assert!(mock.secret_names().is_empty());
}

#[tokio::test]
async fn token_secret_is_deleted_when_reads_fail() {
    let (mock, issuer) = start(MockCluster {
        fail_secret_reads: true,
        ..MockCluster::default()
    })
    .await;

    let err = issuer
        .issue_token(&RepositoryTarget::new("acme", "api", 42), &metadata())
        .await
        .unwrap_err();

    assert!(matches!(err.cause, ClusterError::Kube(_)));
    assert_eq!(
        mock.deleted(),
        vec![format!("github-42-acme-api-token-{}", NAME_SUFFIX)]
    );
    assert!(mock.secret_names().is_empty());
}
