//! Login initiation: mint PKCE material, record the pending authorization
//! and redirect the browser into the proxied authorize URL.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use url::Url;

use authgate_auth::cookie::{SignedEnvelope, StateCookiePayload};
use authgate_auth::oidc::AuthorizationParams;
use authgate_auth::pending::PendingAuthorization;
use authgate_auth::{now_unix_ms, random};
use authgate_proxy::path::build_proxy_path;

use super::internal_error;
use crate::cookies::{external_origin, sanitize_return_to, state_cookie};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

pub async fn handle_login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let config = &state.config;
    let return_to = sanitize_return_to(query.return_to.as_deref());
    let (proto, host) = external_origin(config, &headers);
    let secure = proto == "https";
    let base = format!("{proto}://{host}");

    let redirect_uri = match Url::parse(&format!("{base}/auth/callback")) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, host, "Cannot build callback URL");
            return internal_error("misconfigured");
        }
    };

    let login_state = random::generate_state();
    let nonce = random::generate_nonce();
    let code_verifier = random::generate_code_verifier();
    let code_challenge = random::code_challenge(&code_verifier);

    let authorize_url = match state
        .oidc
        .authorization_url(&AuthorizationParams {
            redirect_uri,
            scope: config.scopes.clone(),
            state: login_state.clone(),
            nonce: nonce.clone(),
            code_challenge,
        })
        .await
    {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "Cannot build authorization URL");
            return internal_error("authorization_unavailable");
        }
    };

    // Send the browser through the gateway's proxy prefix rather than to
    // the IdP directly; the query string carries the PKCE parameters.
    let mut destination = format!(
        "{base}{}",
        build_proxy_path(
            &config.proxy_prefix,
            config.issuer_url.path(),
            authorize_url.path(),
        )
    );
    if let Some(query) = authorize_url.query() {
        destination.push('?');
        destination.push_str(query);
    }

    let envelope_value = match SignedEnvelope::new(StateCookiePayload {
        state: login_state.clone(),
        nonce: nonce.clone(),
        code_verifier: code_verifier.clone(),
        redirect_target: return_to.clone(),
    })
    .encode(config.session_secret.as_bytes())
    {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Cannot sign state cookie");
            return internal_error("misconfigured");
        }
    };

    state.pending.put(PendingAuthorization {
        state: login_state.clone(),
        nonce,
        code_verifier,
        redirect_target: return_to,
        created_at: now_unix_ms(),
    });
    tracing::debug!(state = %login_state, "Login initiated");

    let jar = jar.add(state_cookie(config, envelope_value, secure));
    (jar, Redirect::to(&destination)).into_response()
}
