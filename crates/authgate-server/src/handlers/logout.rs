//! Logout: best-effort provider cleanup, then local session teardown.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::cookies::{clear_session_cookie, external_origin, sanitize_return_to};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

pub async fn handle_logout(
    State(state): State<AppState>,
    Query(query): Query<LogoutQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let config = &state.config;
    let (proto, _) = external_origin(config, &headers);
    let secure = proto == "https";

    let session = jar
        .get(&config.session_cookie)
        .and_then(|cookie| state.sessions.get_from_cookie(cookie.value()));
    if let Some(session) = session {
        // Provider-side cleanup is best-effort; the local session dies
        // regardless.
        if let Some(refresh_token) = &session.tokens.refresh_token
            && let Err(e) = state.oidc.revoke(refresh_token, "refresh_token").await
        {
            tracing::warn!(session_id = %session.id, error = %e, "Refresh token revocation failed");
        }
        if let Err(e) = state.oidc.end_session(session.tokens.id_token.as_deref()).await {
            tracing::warn!(session_id = %session.id, error = %e, "End-session notification failed");
        }
        state.sessions.delete(&session.id);
        tracing::info!(session_id = %session.id, "Session terminated");
    }

    let jar = jar.add(clear_session_cookie(config, secure));
    let destination = sanitize_return_to(query.return_to.as_deref());
    (jar, Redirect::to(&destination)).into_response()
}
