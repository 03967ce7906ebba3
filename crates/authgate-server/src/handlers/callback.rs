//! Authorization callback processing.
//!
//! The state machine runs strictly in order: IdP error, parameter presence,
//! state-cookie equality (CSRF), single-use consume (replay), code
//! exchange, token normalization, best-effort userinfo, session creation.
//! Once `consume` succeeds a retry of the same callback fails at the
//! consume step; a code is never exchanged twice.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use axum::Form;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use authgate_auth::cookie::{StateCookiePayload, decode_signed_cookie};
use authgate_auth::now_unix_ms;
use authgate_auth::oidc::GrantChecks;
use authgate_auth::tokens::SessionTokens;

use super::internal_error;
use crate::cookies::{clear_state_cookie, external_origin, session_cookie};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Query-parameter callback (`response_mode=query`, the default).
pub async fn handle_callback_get(
    state: State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    process_callback(state, headers, jar, params).await
}

/// Form-post callback (`response_mode=form_post`).
pub async fn handle_callback_post(
    state: State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(params): Form<CallbackParams>,
) -> Response {
    process_callback(state, headers, jar, params).await
}

async fn process_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    params: CallbackParams,
) -> Response {
    let config = &state.config;
    let (proto, host) = external_origin(config, &headers);
    let secure = proto == "https";

    if let Some(error) = &params.error {
        tracing::warn!(
            error,
            description = params.error_description.as_deref(),
            "Provider reported an authorization error"
        );
        return error_redirect(&state, jar, secure, error);
    }

    let (Some(state_param), Some(code)) = (params.state.clone(), params.code.clone()) else {
        return error_redirect(&state, jar, secure, "missing_parameters");
    };

    // CSRF check: the callback must arrive in the browser that started the
    // login, proven by the signed state cookie.
    let envelope = jar
        .get(&config.state_cookie)
        .and_then(|cookie| {
            decode_signed_cookie::<StateCookiePayload>(
                cookie.value(),
                config.session_secret.as_bytes(),
            )
        });
    let envelope = match envelope {
        Some(envelope) if envelope.payload.state == state_param => envelope,
        _ => {
            tracing::warn!(state = %state_param, "State cookie missing or mismatched");
            return error_redirect(&state, jar, secure, "state_mismatch");
        }
    };
    // The cookie Max-Age already bounds this, but a replayed Cookie header
    // is not subject to browser expiry.
    if envelope.age_ms(now_unix_ms()) >= config.state_ttl.as_millis() as i64 {
        tracing::warn!(state = %state_param, "State cookie outlived its TTL");
        return error_redirect(&state, jar, secure, "state_expired");
    }

    // Single-use: a replayed callback misses here and no second exchange
    // can happen.
    let Some(pending) = state.pending.consume(&state_param) else {
        tracing::warn!(state = %state_param, "Unknown, expired or already used state");
        return error_redirect(&state, jar, secure, "state_unknown");
    };

    let base = format!("{proto}://{host}");
    let redirect_uri = match Url::parse(&format!("{base}/auth/callback")) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, host, "Cannot build callback URL");
            return internal_error("misconfigured");
        }
    };

    let checks = GrantChecks {
        state: state_param.clone(),
        nonce: pending.nonce.clone(),
        code_verifier: pending.code_verifier.clone(),
    };
    let tokens = match state.oidc.exchange_code(&redirect_uri, &code, &checks).await {
        Ok(response) => match SessionTokens::normalize(response, now_unix_ms()) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(state = %state_param, error = %e, "Token response unusable");
                return error_redirect(&state, jar, secure, "exchange_failed");
            }
        },
        Err(e) => {
            tracing::error!(state = %state_param, error = %e, "Code exchange failed");
            return error_redirect(&state, jar, secure, "exchange_failed");
        }
    };

    // Userinfo is best-effort; a session without cached claims is fine.
    let user_info = match state.oidc.fetch_userinfo(&tokens.access_token).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Userinfo unavailable at login");
            Value::Null
        }
    };
    let subject = user_info
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let record = state.sessions.create(tokens, user_info, subject);
    let cookie_value = state.sessions.cookie_value(&record.id);
    tracing::info!(session_id = %record.id, "Session established");

    let jar = jar
        .add(session_cookie(config, cookie_value, secure))
        .add(clear_state_cookie(config, secure));
    (jar, Redirect::to(&pending.redirect_target)).into_response()
}

/// Redirect to the frontend error page, clearing the state cookie. The
/// reason is reduced to a safe token before it enters the URL.
fn error_redirect(state: &AppState, jar: CookieJar, secure: bool, reason: &str) -> Response {
    let reason: String = reason
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(64)
        .collect();
    let jar = jar.add(clear_state_cookie(&state.config, secure));
    (jar, Redirect::to(&format!("/auth/error?message={reason}"))).into_response()
}
