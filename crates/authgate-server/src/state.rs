//! Shared application state.

use std::sync::Arc;

use authgate_auth::oidc::OidcClient;
use authgate_auth::pending::PendingStore;
use authgate_auth::refresh::RefreshManager;
use authgate_auth::session::SessionStore;
use authgate_proxy::{ProxyEngine, ProxyEngineConfig};

use crate::config::GatewayConfig;

/// Everything a handler needs, cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub oidc: Arc<dyn OidcClient>,
    pub pending: Arc<PendingStore>,
    pub sessions: Arc<SessionStore>,
    pub refresh: Arc<RefreshManager>,
    pub proxy: Arc<ProxyEngine>,
}

impl AppState {
    /// Wire up stores, refresh manager and the proxy engine around a
    /// configured OIDC client.
    pub fn new(config: GatewayConfig, oidc: Arc<dyn OidcClient>) -> anyhow::Result<Self> {
        let pending = Arc::new(PendingStore::new(config.state_ttl));
        let sessions = Arc::new(SessionStore::new(
            config.session_secret.as_bytes().to_vec(),
            config.session_ttl,
        ));
        let refresh = Arc::new(RefreshManager::new(
            Arc::clone(&sessions),
            Arc::clone(&oidc),
        ));
        let proxy = Arc::new(ProxyEngine::new(ProxyEngineConfig::new(
            config.issuer_url.clone(),
            config.proxy_prefix.clone(),
        ))?);

        Ok(Self {
            config: Arc::new(config),
            oidc,
            pending,
            sessions,
            refresh,
            proxy,
        })
    }
}
