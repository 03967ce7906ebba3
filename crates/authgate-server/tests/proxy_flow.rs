//! IdP tunnel tests through the full router.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authgate_auth::oidc::{HttpOidcClient, OidcClientConfig};
use authgate_server::{AppState, GatewayConfig, router};

const HOST: &str = "gw.test";

fn gateway(idp: &MockServer, allowed_origins: Vec<String>) -> Router {
    let config = GatewayConfig {
        issuer_url: Url::parse(&idp.uri()).unwrap(),
        client_id: "gateway".into(),
        client_secret: "s3cr3t".into(),
        scopes: "openid".into(),
        session_secret: "integration-test-secret-0123456789ab".into(),
        session_cookie: "bff_session".into(),
        state_cookie: "bff_auth_state".into(),
        session_ttl: Duration::from_secs(3600),
        state_ttl: Duration::from_secs(300),
        cookie_same_site: cookie::SameSite::Lax,
        trust_proxy_headers: false,
        allowed_origins,
        proxy_prefix: "/oidc".into(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
    };
    let oidc = Arc::new(HttpOidcClient::new(
        OidcClientConfig::new(config.issuer_url.clone(), config.client_id.clone())
            .with_client_secret(config.client_secret.clone()),
    ));
    router(AppState::new(config, oidc).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", HOST)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_proxied_jwks_urls_are_rewritten() {
    let idp = MockServer::start().await;
    let base = idp.uri();
    Mock::given(method("GET"))
        .and(path("/protocol/openid-connect/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": base,
            "jwks_uri": format!("{base}/protocol/openid-connect/certs"),
            "keys": [],
        })))
        .mount(&idp)
        .await;

    let app = gateway(&idp, vec![]);
    let response = app
        .oneshot(get("/oidc/protocol/openid-connect/certs"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-length").is_none());

    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["issuer"], format!("http://{HOST}/oidc"));
    assert_eq!(
        body["jwks_uri"],
        format!("http://{HOST}/oidc/protocol/openid-connect/certs")
    );
}

#[tokio::test]
async fn test_root_discovery_alias_is_rewritten() {
    let idp = MockServer::start().await;
    let base = idp.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
        })))
        .mount(&idp)
        .await;

    let app = gateway(&idp, vec![]);
    let response = app
        .oneshot(get("/.well-known/openid-configuration"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["issuer"], format!("http://{HOST}/oidc"));
    assert_eq!(
        body["authorization_endpoint"],
        format!("http://{HOST}/oidc/authorize")
    );
}

#[tokio::test]
async fn test_proxied_redirect_stays_on_gateway() {
    let idp = MockServer::start().await;
    let target = format!("{}/login-actions/step?execution=1", idp.uri());
    Mock::given(method("GET"))
        .and(path("/authorize"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", target.as_str()))
        .mount(&idp)
        .await;

    let app = gateway(&idp, vec![]);
    let response = app.oneshot(get("/oidc/authorize?client_id=x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get("location").unwrap(),
        &format!("http://{HOST}/oidc/login-actions/step?execution=1")
    );
}

#[tokio::test]
async fn test_traversal_is_rejected_before_upstream() {
    let idp = MockServer::start().await;
    let app = gateway(&idp, vec![]);

    let response = app
        .oneshot(get("/oidc/%2e%2e/secrets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(idp.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cors_rejects_foreign_origin() {
    let idp = MockServer::start().await;
    let app = gateway(&idp, vec!["https://app.test".into()]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/session")
                .header("host", HOST)
                .header("origin", "https://evil.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "origin_not_allowed");
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let idp = MockServer::start().await;
    let app = gateway(&idp, vec!["https://app.test".into()]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/session")
                .header("host", HOST)
                .header("origin", "https://app.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    // Unauthenticated but CORS-approved.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "https://app.test"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-credentials")
            .unwrap(),
        "true"
    );
}
