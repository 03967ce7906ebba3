//! Liveness probe.

use axum::Json;
use axum::response::IntoResponse;

pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
