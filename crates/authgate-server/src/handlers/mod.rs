//! HTTP request handlers.

pub mod callback;
pub mod health;
pub mod login;
pub mod logout;
pub mod proxy;
pub mod session;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// 500 without internals in the body; the detail goes to the log.
pub(crate) fn internal_error(reason: &'static str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({"error": reason})),
    )
        .into_response()
}
