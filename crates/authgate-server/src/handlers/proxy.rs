//! IdP tunnel: hands requests under the proxy prefix to the engine.

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};

use authgate_proxy::headers::ForwardedContext;

use crate::cookies::external_origin;
use crate::state::AppState;

pub async fn handle_proxy(State(state): State<AppState>, request: Request) -> Response {
    let config = &state.config;
    let (proto, host) = external_origin(config, request.headers());
    let client_ip = if config.trust_proxy_headers {
        request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_owned())
    } else {
        None
    };

    let context = ForwardedContext {
        host,
        proto,
        client_ip,
    };
    match state.proxy.forward(request, &context).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response(),
    }
}
