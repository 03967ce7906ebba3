//! The proxy engine: request forwarding and response rewriting.

use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{
    ACCEPT_ENCODING, ACCEPT_RANGES, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LOCATION,
};
use axum::http::{HeaderMap, Method, Response, StatusCode};
use url::Url;

use crate::content::{RewriteContext, is_text_like, rewrite_body};
use crate::error::ProxyError;
use crate::headers::{ForwardedContext, ForwardedHeaderPolicy, is_hop_by_hop, prepare_upstream_headers};
use crate::path::{build_target_path, rewrite_location, split_segments, strip_prefix_segments};

/// Static configuration for a [`ProxyEngine`].
#[derive(Debug, Clone)]
pub struct ProxyEngineConfig {
    /// Upstream base URL, origin plus base path,
    /// e.g. `https://idp.example.com/realms/acme`.
    pub upstream_base: Url,
    /// Gateway-side prefix routed to this engine, e.g. `/oidc`.
    pub proxy_prefix: String,
    pub forwarded_policy: ForwardedHeaderPolicy,
    pub request_timeout: Duration,
}

impl ProxyEngineConfig {
    #[must_use]
    pub fn new(upstream_base: Url, proxy_prefix: impl Into<String>) -> Self {
        Self {
            upstream_base,
            proxy_prefix: proxy_prefix.into(),
            forwarded_policy: ForwardedHeaderPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_forwarded_policy(mut self, policy: ForwardedHeaderPolicy) -> Self {
        self.forwarded_policy = policy;
        self
    }
}

/// Forwards requests under the proxy prefix to the upstream IdP and rewrites
/// upstream-origin references in the responses.
pub struct ProxyEngine {
    config: ProxyEngineConfig,
    prefix_segments: Vec<String>,
    // Origin plus base path, no trailing slash. Rewriting this (rather than
    // the bare origin) keeps rewritten URLs round-trippable through
    // `target_url`, which re-appends the base path.
    upstream_literal: String,
    http: reqwest::Client,
}

impl ProxyEngine {
    pub fn new(config: ProxyEngineConfig) -> Result<Self, ProxyError> {
        if config.upstream_base.host_str().is_none() {
            return Err(ProxyError::InvalidConfig(
                "upstream base URL has no host".into(),
            ));
        }
        // Redirects are rewritten, never followed.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProxyError::InvalidConfig(format!("HTTP client: {e}")))?;
        let prefix_segments = split_segments(&config.proxy_prefix)
            .into_iter()
            .map(str::to_owned)
            .collect();
        let upstream_literal = config
            .upstream_base
            .as_str()
            .trim_end_matches('/')
            .to_owned();
        Ok(Self {
            config,
            prefix_segments,
            upstream_literal,
            http,
        })
    }

    /// The gateway-side prefix this engine is mounted under.
    #[must_use]
    pub fn proxy_prefix(&self) -> &str {
        &self.config.proxy_prefix
    }

    /// Forward `request` upstream and return the rewritten response.
    ///
    /// The path-containment guard runs before anything leaves the process;
    /// a violation yields a 400 and the upstream is never contacted.
    pub async fn forward(
        &self,
        request: Request,
        context: &ForwardedContext,
    ) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = request.into_parts();
        let target_url = self.target_url(parts.uri.path(), parts.uri.query())?;

        let mut headers = prepare_upstream_headers(&parts.headers, context, self.config.forwarded_policy);
        // Body rewriting needs an uncompressed upstream response.
        headers.insert(
            ACCEPT_ENCODING,
            axum::http::HeaderValue::from_static("identity"),
        );

        tracing::debug!(
            method = %parts.method,
            target = %target_url,
            "Forwarding request upstream"
        );

        let mut upstream_request = self
            .http
            .request(parts.method.clone(), target_url.clone())
            .headers(headers);
        if has_body(&parts.method) {
            upstream_request = upstream_request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream_response = upstream_request
            .send()
            .await
            .map_err(ProxyError::from_transport)?;

        self.relay_response(upstream_response, &target_url, context)
            .await
    }

    fn target_url(&self, inbound_path: &str, query: Option<&str>) -> Result<Url, ProxyError> {
        let segments = split_segments(inbound_path);
        let prefix: Vec<&str> = self.prefix_segments.iter().map(String::as_str).collect();
        let remaining = strip_prefix_segments(&segments, &prefix);
        let target_path = build_target_path(self.config.upstream_base.path(), &remaining)?;

        let mut url = self.config.upstream_base.clone();
        url.set_path(&target_path);
        url.set_query(query);
        Ok(url)
    }

    async fn relay_response(
        &self,
        upstream: reqwest::Response,
        target_url: &Url,
        context: &ForwardedContext,
    ) -> Result<Response<Body>, ProxyError> {
        let status = StatusCode::from_u16(upstream.status().as_u16())
            .map_err(|e| ProxyError::Relay(format!("invalid upstream status: {e}")))?;
        let gateway_origin = format!("{}://{}", context.proto, context.host);

        let mut headers = HeaderMap::new();
        for (name, value) in upstream.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        if let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok())
            && let Some(rewritten) = rewrite_location(
                location,
                target_url,
                &self.config.upstream_base,
                &gateway_origin,
                &self.config.proxy_prefix,
            )
        {
            tracing::debug!(location = %rewritten, "Rewrote upstream redirect");
            headers.insert(
                LOCATION,
                rewritten
                    .parse()
                    .map_err(|e| ProxyError::Relay(format!("rewritten location: {e}")))?,
            );
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();

        let body = if is_text_like(&content_type) {
            let bytes = upstream
                .bytes()
                .await
                .map_err(|e| ProxyError::Relay(format!("reading upstream body: {e}")))?;
            let gateway_base = format!("{gateway_origin}{}", self.config.proxy_prefix);
            match std::str::from_utf8(&bytes) {
                Ok(text) => {
                    let ctx = RewriteContext {
                        upstream_origin: &self.upstream_literal,
                        gateway_base: &gateway_base,
                        proxy_prefix: &self.config.proxy_prefix,
                    };
                    let rewritten = rewrite_body(text, &content_type, &ctx);
                    // Length, encoding and validators no longer describe
                    // the rewritten bytes.
                    headers.remove(CONTENT_LENGTH);
                    headers.remove(CONTENT_ENCODING);
                    headers.remove(ETAG);
                    headers.remove(ACCEPT_RANGES);
                    Body::from(rewritten)
                }
                Err(_) => Body::from(bytes),
            }
        } else {
            Body::from_stream(upstream.bytes_stream())
        };

        let mut response = Response::builder()
            .status(status)
            .body(body)
            .map_err(|e| ProxyError::Relay(e.to_string()))?;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn has_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
