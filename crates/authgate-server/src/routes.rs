//! Router assembly.

use axum::Router;
use axum::middleware;
use axum::routing::{any, get};
use tower_http::trace::TraceLayer;

use crate::handlers::{callback, health, login, logout, proxy, session};
use crate::state::AppState;
use crate::cors;

/// Build the gateway router: auth endpoints (with CORS), health probe and
/// the IdP tunnel under the configured proxy prefix.
pub fn router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/auth/login", get(login::handle_login))
        .route(
            "/auth/callback",
            get(callback::handle_callback_get).post(callback::handle_callback_post),
        )
        .route(
            "/auth/logout",
            get(logout::handle_logout).post(logout::handle_logout),
        )
        .route("/auth/session", get(session::handle_session))
        .layer(middleware::from_fn_with_state(state.clone(), cors::apply));

    let prefix = state.config.proxy_prefix.clone();
    Router::new()
        .merge(auth)
        .route("/healthz", get(health::handle_health))
        // Root-level alias for provider metadata, so clients can discover
        // the gateway without knowing the proxy prefix. Prefix stripping is
        // a no-op for this path, which lands it on the upstream document
        // with the same URL rewriting as the tunnel.
        .route(
            "/.well-known/openid-configuration",
            get(proxy::handle_proxy),
        )
        .route(&prefix, any(proxy::handle_proxy))
        .route(&format!("{prefix}/{{*path}}"), any(proxy::handle_proxy))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
