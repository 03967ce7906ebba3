//! Path handling for the proxy: prefix stripping, target construction and
//! Location rewriting.
//!
//! Every inbound path segment is validated before it can reach the upstream
//! URL. The checks run on both the raw segment and its percent-decoded form,
//! so `%2e%2e` is caught the same as `..`.

use url::Url;

use crate::error::ProxyError;

/// Split a URL path into its non-empty segments.
#[must_use]
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Drop every leading repetition of the proxy prefix segments.
///
/// Stripping is idempotent: `/oidc/oidc/token` and `/oidc/token` both yield
/// `["token"]`, so a client cannot stack prefixes to confuse the router.
#[must_use]
pub fn strip_prefix_segments<'a>(segments: &[&'a str], prefix: &[&str]) -> Vec<&'a str> {
    let mut rest = segments;
    while !prefix.is_empty() && rest.len() >= prefix.len() && rest[..prefix.len()] == *prefix {
        rest = &rest[prefix.len()..];
    }
    rest.to_vec()
}

/// Reject a segment that could alter the target path's meaning.
pub fn validate_segment(segment: &str) -> Result<(), ProxyError> {
    check_segment(segment)?;
    let decoded = percent_decode(segment)
        .ok_or_else(|| ProxyError::PathViolation("invalid percent-encoding".into()))?;
    check_segment(&decoded)
}

fn check_segment(segment: &str) -> Result<(), ProxyError> {
    if segment == "." || segment == ".." {
        return Err(ProxyError::PathViolation("dot segment".into()));
    }
    if segment.contains('/') || segment.contains('\\') {
        return Err(ProxyError::PathViolation("embedded path separator".into()));
    }
    if segment.chars().any(|c| c.is_control()) {
        return Err(ProxyError::PathViolation("control character".into()));
    }
    Ok(())
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_digit(*bytes.get(i + 1)?)?;
            let lo = hex_digit(*bytes.get(i + 2)?)?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Join validated segments under the upstream base path.
///
/// Validation happens here, immediately before the segments become part of
/// an upstream URL; any violation aborts before the upstream is contacted.
pub fn build_target_path(base_path: &str, segments: &[&str]) -> Result<String, ProxyError> {
    for segment in segments {
        validate_segment(segment)?;
    }
    let base = base_path.trim_end_matches('/');
    if segments.is_empty() {
        return Ok(if base.is_empty() { "/".into() } else { base.into() });
    }
    Ok(format!("{base}/{}", segments.join("/")))
}

/// Gateway-side path for an upstream path: proxy prefix plus the remainder
/// after the upstream base path.
#[must_use]
pub fn build_proxy_path(proxy_prefix: &str, upstream_base_path: &str, upstream_path: &str) -> String {
    let base = upstream_base_path.trim_end_matches('/');
    let remainder = upstream_path.strip_prefix(base).unwrap_or(upstream_path);
    let prefix = proxy_prefix.trim_end_matches('/');
    if remainder.is_empty() {
        format!("{prefix}/")
    } else if remainder.starts_with('/') {
        format!("{prefix}{remainder}")
    } else {
        format!("{prefix}/{remainder}")
    }
}

/// Rewrite a `Location` header value to route back through the gateway.
///
/// Returns `None` when the location points outside the upstream origin (or
/// does not parse); such redirects pass through untouched.
#[must_use]
pub fn rewrite_location(
    location: &str,
    upstream_request_url: &Url,
    upstream_base: &Url,
    gateway_origin: &str,
    proxy_prefix: &str,
) -> Option<String> {
    let resolved = upstream_request_url.join(location).ok()?;
    if resolved.origin() != upstream_base.origin() {
        return None;
    }
    let mut rewritten = format!(
        "{gateway_origin}{}",
        build_proxy_path(proxy_prefix, upstream_base.path(), resolved.path())
    );
    if let Some(query) = resolved.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    if let Some(fragment) = resolved.fragment() {
        rewritten.push('#');
        rewritten.push_str(fragment);
    }
    Some(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segments_drops_empties() {
        assert_eq!(split_segments("/a//b/"), vec!["a", "b"]);
        assert!(split_segments("/").is_empty());
        assert!(split_segments("").is_empty());
    }

    #[test]
    fn test_strip_prefix_is_idempotent() {
        let prefix = ["oidc"];
        assert_eq!(
            strip_prefix_segments(&["oidc", "token"], &prefix),
            vec!["token"]
        );
        assert_eq!(
            strip_prefix_segments(&["oidc", "oidc", "oidc", "token"], &prefix),
            vec!["token"]
        );
        assert_eq!(
            strip_prefix_segments(&["token", "oidc"], &prefix),
            vec!["token", "oidc"]
        );
    }

    #[test]
    fn test_validate_rejects_traversal() {
        assert!(validate_segment("..").is_err());
        assert!(validate_segment(".").is_err());
        assert!(validate_segment("%2e%2e").is_err());
        assert!(validate_segment("%2E%2E").is_err());
        assert!(validate_segment("a%2fb").is_err());
        assert!(validate_segment("a\\b").is_err());
        assert!(validate_segment("a\u{0}b").is_err());
        assert!(validate_segment("%zz").is_err());
    }

    #[test]
    fn test_validate_accepts_ordinary_segments() {
        assert!(validate_segment("protocol").is_ok());
        assert!(validate_segment("openid-connect").is_ok());
        assert!(validate_segment("jwks.json").is_ok());
        assert!(validate_segment("certs%20v2").is_ok());
    }

    #[test]
    fn test_build_target_path_joins_under_base() {
        let path = build_target_path("/realms/acme", &["protocol", "token"]).unwrap();
        assert_eq!(path, "/realms/acme/protocol/token");
        assert_eq!(build_target_path("/realms/acme/", &[]).unwrap(), "/realms/acme");
        assert_eq!(build_target_path("", &[]).unwrap(), "/");
    }

    #[test]
    fn test_build_target_path_rejects_bad_segment() {
        assert!(build_target_path("/realms/acme", &["..", "secrets"]).is_err());
    }

    fn base() -> Url {
        Url::parse("https://idp.example.com/realms/acme").unwrap()
    }

    fn request_url() -> Url {
        Url::parse("https://idp.example.com/realms/acme/protocol/openid-connect/auth").unwrap()
    }

    #[test]
    fn test_rewrite_location_same_origin() {
        let rewritten = rewrite_location(
            "https://idp.example.com/realms/acme/login-actions/authenticate?tab=1",
            &request_url(),
            &base(),
            "https://gw.example.com",
            "/oidc",
        );
        assert_eq!(
            rewritten.as_deref(),
            Some("https://gw.example.com/oidc/login-actions/authenticate?tab=1")
        );
    }

    #[test]
    fn test_rewrite_location_relative() {
        let rewritten = rewrite_location(
            "../login-actions/required-action",
            &request_url(),
            &base(),
            "https://gw.example.com",
            "/oidc",
        );
        assert_eq!(
            rewritten.as_deref(),
            Some("https://gw.example.com/oidc/protocol/login-actions/required-action")
        );
    }

    #[test]
    fn test_rewrite_location_foreign_origin_passes_through() {
        let rewritten = rewrite_location(
            "https://other.example.com/done",
            &request_url(),
            &base(),
            "https://gw.example.com",
            "/oidc",
        );
        assert!(rewritten.is_none());
    }

    #[test]
    fn test_rewrite_location_preserves_fragment() {
        let rewritten = rewrite_location(
            "https://idp.example.com/realms/acme/page#section",
            &request_url(),
            &base(),
            "https://gw.example.com",
            "/oidc",
        );
        assert_eq!(
            rewritten.as_deref(),
            Some("https://gw.example.com/oidc/page#section")
        );
    }
}
