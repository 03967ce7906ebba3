//! OIDC discovery document fetching.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Subset of the OpenID Provider Metadata this gateway consumes.
///
/// Unknown fields are ignored so providers with rich metadata documents
/// deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

impl DiscoveryDocument {
    /// Whether the provider advertises S256 PKCE support. Absent metadata
    /// counts as supported, matching how most providers behave.
    #[must_use]
    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_none_or(|methods| methods.iter().any(|m| m == "S256"))
    }
}

/// Well-known discovery URL for an issuer, tolerating a trailing slash on
/// the configured issuer.
pub fn discovery_url(issuer: &Url) -> Result<Url, AuthError> {
    let base = issuer.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/.well-known/openid-configuration"))
        .map_err(|e| AuthError::DiscoveryFailed(format!("invalid issuer URL: {e}")))
}

/// Fetch and parse the discovery document for `issuer`.
pub async fn fetch_discovery(
    http: &reqwest::Client,
    issuer: &Url,
) -> Result<DiscoveryDocument, AuthError> {
    let url = discovery_url(issuer)?;
    tracing::debug!(url = %url, "Fetching OIDC discovery document");

    let response = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| AuthError::DiscoveryFailed(format!("request to {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AuthError::DiscoveryFailed(format!(
            "{url} returned HTTP {}",
            response.status()
        )));
    }

    response
        .json::<DiscoveryDocument>()
        .await
        .map_err(|e| AuthError::DiscoveryFailed(format!("invalid discovery document: {e}")))
}
