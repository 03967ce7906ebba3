//! Origin-allowlist CORS for the auth endpoints.
//!
//! No configured origins means CORS is disabled: cross-origin responses get
//! no CORS headers and preflights answer 204 without allowances. With a
//! list configured, a foreign origin is rejected outright and an allowed
//! origin gets credentialed access.

use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, ORIGIN, VARY};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

pub async fn apply(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_end_matches('/').to_owned());
    let is_preflight = request.method() == Method::OPTIONS;
    let requested_headers = request
        .headers()
        .get("access-control-request-headers")
        .cloned();

    let allowlist = &state.config.allowed_origins;
    if allowlist.is_empty() {
        if is_preflight {
            return StatusCode::NO_CONTENT.into_response();
        }
        return next.run(request).await;
    }

    let allowed = match &origin {
        Some(origin) => allowlist.iter().any(|o| o == origin),
        // Same-origin requests carry no Origin header and always pass.
        None => return next.run(request).await,
    };
    if !allowed {
        tracing::debug!(origin = origin.as_deref(), "Rejected disallowed origin");
        return (
            StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({"error": "origin_not_allowed"})),
        )
            .into_response();
    }

    let mut response = if is_preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Some(origin) = origin.as_deref().and_then(|o| HeaderValue::try_from(o).ok()) {
        headers.insert("access-control-allow-origin", origin);
    }
    headers.insert(
        "access-control-allow-credentials",
        HeaderValue::from_static("true"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("Content-Type, Location"),
    );
    headers.insert(VARY, HeaderValue::from_static("Origin"));
    if is_preflight {
        headers.insert(
            "access-control-allow-methods",
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        let allow_headers = requested_headers
            .unwrap_or_else(|| HeaderValue::from_static("Content-Type"));
        headers.insert("access-control-allow-headers", allow_headers);
    }
    response
}
