//! Header handling for proxied requests.

use axum::http::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};

/// How `x-forwarded-*` headers are produced for the upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardedHeaderPolicy {
    /// Always set from the current request, discarding inbound values.
    #[default]
    Override,
    /// Keep an inbound value when present, set it otherwise.
    Preserve,
    /// Comma-join the current request's value onto an inbound value.
    Append,
}

impl ForwardedHeaderPolicy {
    /// Parse a policy name as it appears in configuration.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "override" => Some(Self::Override),
            "preserve" => Some(Self::Preserve),
            "append" => Some(Self::Append),
            _ => None,
        }
    }
}

/// Forwarding facts about the inbound request.
#[derive(Debug, Clone)]
pub struct ForwardedContext {
    /// Host the browser addressed, e.g. `gw.example.com`.
    pub host: String,
    /// `http` or `https`.
    pub proto: String,
    /// Client address when known.
    pub client_ip: Option<String>,
}

/// Hop-by-hop headers that must not travel through a proxy (RFC 9110 §7.6.1).
pub fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Build the header map for the upstream request.
///
/// Copies end-to-end headers, drops hop-by-hop ones and `host` (the HTTP
/// client sets the upstream host), defaults `accept` when the client sent
/// none, then applies the forwarded-header policy.
#[must_use]
pub fn prepare_upstream_headers(
    inbound: &HeaderMap,
    context: &ForwardedContext,
    policy: ForwardedHeaderPolicy,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        let lower = name.as_str().to_ascii_lowercase();
        if lower == "host" || is_hop_by_hop(&lower) || lower == "content-length" {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    }

    apply_forwarded(&mut headers, "x-forwarded-host", &context.host, policy);
    apply_forwarded(&mut headers, "x-forwarded-proto", &context.proto, policy);
    if let Some(ip) = &context.client_ip {
        apply_forwarded(&mut headers, "x-forwarded-for", ip, policy);
    }
    headers
}

fn apply_forwarded(headers: &mut HeaderMap, name: &str, value: &str, policy: ForwardedHeaderPolicy) {
    let Ok(header_name) = HeaderName::try_from(name) else {
        return;
    };
    let existing = headers
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let next = match (policy, existing) {
        (ForwardedHeaderPolicy::Preserve, Some(_)) => return,
        (ForwardedHeaderPolicy::Append, Some(current)) => format!("{current}, {value}"),
        _ => value.to_owned(),
    };
    if let Ok(header_value) = HeaderValue::try_from(next) {
        headers.insert(header_name, header_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ForwardedContext {
        ForwardedContext {
            host: "gw.example.com".into(),
            proto: "https".into(),
            client_ip: Some("203.0.113.9".into()),
        }
    }

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("host", "gw.example.com".parse().unwrap());
        headers.insert("accept", "text/html".parse().unwrap());
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("cookie", "bff_session=abc".parse().unwrap());
        headers
    }

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("TE"));
        assert!(!is_hop_by_hop("accept"));
        assert!(!is_hop_by_hop("authorization"));
    }

    #[test]
    fn test_prepare_drops_hop_by_hop_and_host() {
        let headers = prepare_upstream_headers(
            &inbound(),
            &context(),
            ForwardedHeaderPolicy::Override,
        );
        assert!(headers.get("host").is_none());
        assert!(headers.get("connection").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("accept").unwrap(), "text/html");
        assert_eq!(headers.get("cookie").unwrap(), "bff_session=abc");
    }

    #[test]
    fn test_accept_defaults_when_absent() {
        let mut base = inbound();
        base.remove("accept");
        let headers =
            prepare_upstream_headers(&base, &context(), ForwardedHeaderPolicy::Override);
        assert_eq!(headers.get("accept").unwrap(), "*/*");

        // An explicit client value is left alone.
        let headers = prepare_upstream_headers(
            &inbound(),
            &context(),
            ForwardedHeaderPolicy::Override,
        );
        assert_eq!(headers.get("accept").unwrap(), "text/html");
    }

    #[test]
    fn test_override_replaces_inbound_forwarded() {
        let mut base = inbound();
        base.insert("x-forwarded-host", "spoofed.example.com".parse().unwrap());
        let headers =
            prepare_upstream_headers(&base, &context(), ForwardedHeaderPolicy::Override);
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "gw.example.com");
        assert_eq!(headers.get("x-forwarded-proto").unwrap(), "https");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "203.0.113.9");
    }

    #[test]
    fn test_preserve_keeps_inbound_forwarded() {
        let mut base = inbound();
        base.insert("x-forwarded-proto", "http".parse().unwrap());
        let headers =
            prepare_upstream_headers(&base, &context(), ForwardedHeaderPolicy::Preserve);
        assert_eq!(headers.get("x-forwarded-proto").unwrap(), "http");
        // Absent headers are still set.
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "gw.example.com");
    }

    #[test]
    fn test_append_joins_values() {
        let mut base = inbound();
        base.insert("x-forwarded-for", "198.51.100.7".parse().unwrap());
        let headers =
            prepare_upstream_headers(&base, &context(), ForwardedHeaderPolicy::Append);
        assert_eq!(
            headers.get("x-forwarded-for").unwrap(),
            "198.51.100.7, 203.0.113.9"
        );
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            ForwardedHeaderPolicy::parse("override"),
            Some(ForwardedHeaderPolicy::Override)
        );
        assert_eq!(
            ForwardedHeaderPolicy::parse("Preserve"),
            Some(ForwardedHeaderPolicy::Preserve)
        );
        assert_eq!(
            ForwardedHeaderPolicy::parse("APPEND"),
            Some(ForwardedHeaderPolicy::Append)
        );
        assert_eq!(ForwardedHeaderPolicy::parse("other"), None);
    }
}
