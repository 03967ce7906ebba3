//! The OIDC client capability.
//!
//! [`OidcClient`] is the seam between the gateway's flow logic and the
//! identity provider: discovery, authorization URL construction, the
//! authorization-code and refresh-token grants, userinfo, revocation and
//! RP-initiated logout. [`HttpOidcClient`] is the production implementation;
//! tests substitute their own.
//!
//! Nonce binding lives here: when a token response carries an `id_token`,
//! this client validates its signature against the provider JWKS and checks
//! `iss`, `aud` and `nonce` before the response is handed back. Callers do
//! not re-validate claims.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use crate::discovery::{DiscoveryDocument, fetch_discovery};
use crate::error::AuthError;
use crate::jwks::JwksCache;
use crate::tokens::{OAuthErrorResponse, TokenEndpointResponse};

/// Everything needed to build an authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationParams {
    /// Callback URL on the gateway.
    pub redirect_uri: Url,
    /// Space-separated scope string.
    pub scope: String,
    pub state: String,
    pub nonce: String,
    /// S256 challenge derived from the PKCE verifier.
    pub code_challenge: String,
}

/// Server-held values the client validates the grant against.
#[derive(Debug, Clone)]
pub struct GrantChecks {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

/// Operations the gateway needs from an OpenID Connect provider.
#[async_trait]
pub trait OidcClient: Send + Sync {
    /// Provider metadata, cached by implementations after first success.
    async fn discover(&self) -> Result<DiscoveryDocument, AuthError>;

    /// Build the provider's authorization endpoint URL for a new login.
    async fn authorization_url(&self, params: &AuthorizationParams) -> Result<Url, AuthError>;

    /// Redeem an authorization code, validating any returned ID token
    /// against `checks`.
    async fn exchange_code(
        &self,
        redirect_uri: &Url,
        code: &str,
        checks: &GrantChecks,
    ) -> Result<TokenEndpointResponse, AuthError>;

    /// Run a refresh-token grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenEndpointResponse, AuthError>;

    /// Fetch claims from the userinfo endpoint with a bearer token.
    async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, AuthError>;

    /// Revoke a token at the provider. A provider without a revocation
    /// endpoint is a no-op.
    async fn revoke(&self, token: &str, token_type_hint: &str) -> Result<(), AuthError>;

    /// Notify the provider's end-session endpoint. A provider without one
    /// is a no-op.
    async fn end_session(&self, id_token_hint: Option<&str>) -> Result<(), AuthError>;
}

/// Static configuration for [`HttpOidcClient`].
#[derive(Debug, Clone)]
pub struct OidcClientConfig {
    pub issuer: Url,
    pub client_id: String,
    /// Present for confidential clients; public clients rely on PKCE alone.
    pub client_secret: Option<String>,
    pub request_timeout: Duration,
    pub jwks_cache_ttl: Duration,
}

impl OidcClientConfig {
    #[must_use]
    pub fn new(issuer: Url, client_id: impl Into<String>) -> Self {
        Self {
            issuer,
            client_id: client_id.into(),
            client_secret: None,
            request_timeout: Duration::from_secs(10),
            jwks_cache_ttl: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// HTTP implementation of [`OidcClient`] against a single provider.
pub struct HttpOidcClient {
    config: OidcClientConfig,
    http: reqwest::Client,
    discovery: OnceCell<DiscoveryDocument>,
    jwks: JwksCache,
}

impl HttpOidcClient {
    #[must_use]
    pub fn new(config: OidcClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");
        let jwks = JwksCache::new(config.jwks_cache_ttl);
        Self {
            config,
            http,
            discovery: OnceCell::new(),
            jwks,
        }
    }

    fn base_grant_form<'a>(&'a self, grant_type: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut form = vec![
            ("grant_type", grant_type),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        form
    }

    async fn post_grant(
        &self,
        token_endpoint: &str,
        form: &[(&str, &str)],
        on_failure: fn(String) -> AuthError,
    ) -> Result<TokenEndpointResponse, AuthError> {
        let response = self
            .http
            .post(token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| on_failure(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<OAuthErrorResponse>(&body) {
                Ok(oauth) => AuthError::provider(oauth.error, oauth.error_description),
                Err(_) => on_failure(format!("token endpoint returned HTTP {status}")),
            });
        }

        response
            .json::<TokenEndpointResponse>()
            .await
            .map_err(|e| on_failure(format!("invalid token response body: {e}")))
    }

    async fn validate_id_token(
        &self,
        doc: &DiscoveryDocument,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, AuthError> {
        let header = decode_header(id_token)
            .map_err(|e| AuthError::IdTokenInvalid(format!("unreadable header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::IdTokenInvalid("header has no kid".into()))?;

        let (key, key_alg) = self
            .jwks
            .decoding_key(&self.http, &doc.jwks_uri, &kid)
            .await?;
        let algorithm = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&doc.issuer]);
        validation.set_audience(&[&self.config.client_id]);
        validation.leeway = 30;

        let claims = decode_claims(id_token, &key, &validation)?;
        if claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(AuthError::NonceMismatch);
        }
        Ok(claims)
    }
}

#[async_trait]
impl OidcClient for HttpOidcClient {
    async fn discover(&self) -> Result<DiscoveryDocument, AuthError> {
        self.discovery
            .get_or_try_init(|| fetch_discovery(&self.http, &self.config.issuer))
            .await
            .cloned()
    }

    async fn authorization_url(&self, params: &AuthorizationParams) -> Result<Url, AuthError> {
        let doc = self.discover().await?;
        let mut url = Url::parse(&doc.authorization_endpoint).map_err(|e| {
            AuthError::DiscoveryFailed(format!("invalid authorization_endpoint: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", params.redirect_uri.as_str())
            .append_pair("scope", &params.scope)
            .append_pair("state", &params.state)
            .append_pair("nonce", &params.nonce)
            .append_pair("code_challenge", &params.code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    async fn exchange_code(
        &self,
        redirect_uri: &Url,
        code: &str,
        checks: &GrantChecks,
    ) -> Result<TokenEndpointResponse, AuthError> {
        let doc = self.discover().await?;
        let redirect = redirect_uri.to_string();
        let mut form = self.base_grant_form("authorization_code");
        form.push(("code", code));
        form.push(("redirect_uri", redirect.as_str()));
        form.push(("code_verifier", checks.code_verifier.as_str()));

        tracing::debug!(state = %checks.state, "Exchanging authorization code");
        let response = self
            .post_grant(&doc.token_endpoint, &form, AuthError::ExchangeFailed)
            .await?;

        if let Some(id_token) = &response.id_token {
            let claims = self
                .validate_id_token(&doc, id_token, &checks.nonce)
                .await?;
            tracing::debug!(sub = %claims.sub, "Validated ID token");
        }
        Ok(response)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenEndpointResponse, AuthError> {
        let doc = self.discover().await?;
        let mut form = self.base_grant_form("refresh_token");
        form.push(("refresh_token", refresh_token));
        self.post_grant(&doc.token_endpoint, &form, AuthError::RefreshFailed)
            .await
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, AuthError> {
        let doc = self.discover().await?;
        let endpoint = doc.userinfo_endpoint.ok_or_else(|| {
            AuthError::UserinfoFailed("provider advertises no userinfo endpoint".into())
        })?;

        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::UserinfoFailed(describe_transport_error(&e)))?;
        if !response.status().is_success() {
            return Err(AuthError::UserinfoFailed(format!(
                "userinfo endpoint returned HTTP {}",
                response.status()
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| AuthError::UserinfoFailed(format!("invalid userinfo body: {e}")))
    }

    async fn revoke(&self, token: &str, token_type_hint: &str) -> Result<(), AuthError> {
        let doc = self.discover().await?;
        let Some(endpoint) = doc.revocation_endpoint else {
            tracing::debug!("Provider advertises no revocation endpoint, skipping");
            return Ok(());
        };

        let mut form = vec![
            ("token", token),
            ("token_type_hint", token_type_hint),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::RevocationFailed(describe_transport_error(&e)))?;
        if !response.status().is_success() {
            // RFC 7009 providers answer 200 even for unknown tokens, so a
            // non-2xx here is worth surfacing.
            return Err(AuthError::RevocationFailed(format!(
                "revocation endpoint returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn end_session(&self, id_token_hint: Option<&str>) -> Result<(), AuthError> {
        let doc = self.discover().await?;
        let Some(endpoint) = doc.end_session_endpoint else {
            tracing::debug!("Provider advertises no end-session endpoint, skipping");
            return Ok(());
        };

        let mut form = vec![("client_id", self.config.client_id.as_str())];
        if let Some(hint) = id_token_hint {
            form.push(("id_token_hint", hint));
        }

        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::EndSessionFailed(describe_transport_error(&e)))?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::FOUND {
            return Err(AuthError::EndSessionFailed(format!(
                "end-session endpoint returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Claims this gateway reads from an ID token.
#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn decode_claims(
    id_token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<IdTokenClaims, AuthError> {
    decode::<IdTokenClaims>(id_token, key, validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::IdTokenInvalid(e.to_string()))
}

/// `aud` may be a single string or an array of strings.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(auds) => auds,
    })
}

/// Keep transport errors descriptive without leaking request bodies.
fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".into()
    } else if error.is_connect() {
        "connection to provider failed".into()
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_discovery(server: &MockServer) {
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "jwks_uri": format!("{base}/jwks"),
                "userinfo_endpoint": format!("{base}/userinfo"),
                "revocation_endpoint": format!("{base}/revoke"),
            })))
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer) -> HttpOidcClient {
        let issuer = Url::parse(&server.uri()).unwrap();
        HttpOidcClient::new(
            OidcClientConfig::new(issuer, "gateway").with_client_secret("s3cr3t"),
        )
    }

    fn checks() -> GrantChecks {
        GrantChecks {
            state: "state".into(),
            nonce: "nonce".into(),
            code_verifier: "verifier".into(),
        }
    }

    #[tokio::test]
    async fn test_authorization_url_carries_pkce_parameters() {
        let server = MockServer::start().await;
        mock_discovery(&server).await;

        let client = client_for(&server);
        let url = client
            .authorization_url(&AuthorizationParams {
                redirect_uri: Url::parse("https://gw.example.com/auth/callback").unwrap(),
                scope: "openid profile".into(),
                state: "st".into(),
                nonce: "no".into(),
                code_challenge: "ch".into(),
            })
            .await
            .unwrap();

        assert!(url.path().ends_with("/authorize"));
        let query: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "gateway");
        assert_eq!(query["state"], "st");
        assert_eq!(query["nonce"], "no");
        assert_eq!(query["code_challenge"], "ch");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["scope"], "openid profile");
    }

    #[tokio::test]
    async fn test_exchange_code_posts_grant_form() {
        let server = MockServer::start().await;
        mock_discovery(&server).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("code_verifier=verifier"))
            .and(body_string_contains("client_secret=s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "token_type": "Bearer",
                "expires_in": 300,
                "refresh_token": "rt"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let redirect = Url::parse("https://gw.example.com/auth/callback").unwrap();
        let response = client
            .exchange_code(&redirect, "abc", &checks())
            .await
            .unwrap();
        assert_eq!(response.access_token.as_deref(), Some("at"));
        assert_eq!(response.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn test_exchange_code_surfaces_oauth_error() {
        let server = MockServer::start().await;
        mock_discovery(&server).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let redirect = Url::parse("https://gw.example.com/auth/callback").unwrap();
        let err = client
            .exchange_code(&redirect, "stale", &checks())
            .await
            .unwrap_err();
        match err {
            AuthError::Provider { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert_eq!(description, "code expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        mock_discovery(&server).await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at2",
                "expires_in": 300
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.refresh("rt").await.unwrap();
        assert_eq!(response.access_token.as_deref(), Some("at2"));
    }

    #[tokio::test]
    async fn test_fetch_userinfo_sends_bearer_token() {
        let server = MockServer::start().await;
        mock_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(wiremock::matchers::header("authorization", "Bearer at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "alice",
                "email": "alice@example.com"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let claims = client.fetch_userinfo("at").await.unwrap();
        assert_eq!(claims["sub"], "alice");
    }

    #[tokio::test]
    async fn test_revoke_posts_token_hint() {
        let server = MockServer::start().await;
        mock_discovery(&server).await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains("token=rt"))
            .and(body_string_contains("token_type_hint=refresh_token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.revoke("rt", "refresh_token").await.unwrap();
    }

    #[tokio::test]
    async fn test_end_session_without_endpoint_is_noop() {
        let server = MockServer::start().await;
        mock_discovery(&server).await;

        let client = client_for(&server);
        client.end_session(Some("idt")).await.unwrap();
    }

    #[tokio::test]
    async fn test_discovery_is_cached() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "jwks_uri": format!("{base}/jwks"),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.discover().await.unwrap();
        client.discover().await.unwrap();
    }

    #[test]
    fn test_audience_accepts_string_or_array() {
        let one: IdTokenClaims = serde_json::from_value(serde_json::json!({
            "iss": "i", "sub": "s", "aud": "gateway", "exp": 1
        }))
        .unwrap();
        assert_eq!(one.aud, vec!["gateway"]);

        let many: IdTokenClaims = serde_json::from_value(serde_json::json!({
            "iss": "i", "sub": "s", "aud": ["gateway", "other"], "exp": 1
        }))
        .unwrap();
        assert_eq!(many.aud, vec!["gateway", "other"]);
    }
}
