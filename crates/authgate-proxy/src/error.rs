//! Proxy error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors produced while forwarding a request upstream.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A path segment failed validation or the target escaped the upstream
    /// base path. The upstream is never contacted.
    #[error("Invalid proxy path: {0}")]
    PathViolation(String),

    /// The engine was configured with an unusable upstream base URL.
    #[error("Invalid proxy configuration: {0}")]
    InvalidConfig(String),

    /// The upstream could not be reached or timed out.
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// The upstream response could not be relayed.
    #[error("Failed to relay upstream response: {0}")]
    Relay(String),
}

impl ProxyError {
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Upstream("request timed out".into())
        } else if error.is_connect() {
            Self::Upstream("connection failed".into())
        } else {
            Self::Upstream(error.to_string())
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::PathViolation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) | Self::Relay(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Proxy request failed");
        } else {
            tracing::debug!(error = %self, "Rejected proxy request");
        }
        let body = axum::Json(serde_json::json!({
            "error": match self {
                Self::PathViolation(_) => "invalid_path",
                Self::InvalidConfig(_) => "misconfigured",
                Self::Upstream(_) => "upstream_unavailable",
                Self::Relay(_) => "relay_failed",
            }
        }));
        (status, body).into_response()
    }
}
