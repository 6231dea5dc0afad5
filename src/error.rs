use crate::github::GitHubError;
use crate::provisioning::ProvisionError;
use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    #[error("{0}")]
    Provision(#[from] ProvisionError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Invalid or expired state token")]
    InvalidState,

    #[error("GitHub App not configured")]
    AppNotConfigured,
}

impl AppError {
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convert AppError to HTTP status codes for web responses
impl AppError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::GitHub(GitHubError::Api { status: 401, .. }) => StatusCode::UNAUTHORIZED,
            Self::GitHub(GitHubError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            Self::GitHub(_) => StatusCode::BAD_GATEWAY,
            Self::Provision(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::InvalidState => StatusCode::BAD_REQUEST,
            Self::AppNotConfigured => StatusCode::NOT_FOUND,
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16()
        });
        (status, axum::Json(body)).into_response()
    }
}
