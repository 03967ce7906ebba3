//! Authgate entry point.

use std::process::exit;
use std::sync::Arc;

use authgate_auth::oidc::{HttpOidcClient, OidcClientConfig};
use authgate_server::{AppState, GatewayConfig, router, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            exit(2);
        }
    };
    tracing::info!(
        issuer = %config.issuer_url,
        proxy_prefix = %config.proxy_prefix,
        "Starting Authgate"
    );

    let oidc = Arc::new(HttpOidcClient::new(
        OidcClientConfig::new(config.issuer_url.clone(), config.client_id.clone())
            .with_client_secret(config.client_secret.clone()),
    ));

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, oidc)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown handler");
        return;
    }
    tracing::info!("Shutting down");
}
