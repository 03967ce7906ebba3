//! Cookie construction and request-origin resolution.

use axum::http::HeaderMap;
use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};

use crate::config::GatewayConfig;

/// Build the signed state cookie set when a login starts.
pub fn state_cookie(config: &GatewayConfig, value: String, secure: bool) -> Cookie<'static> {
    scoped_cookie(
        config.state_cookie.clone(),
        value,
        config.cookie_same_site,
        secure,
        CookieDuration::seconds(config.state_ttl.as_secs() as i64),
    )
}

/// Build the session cookie set after a successful callback.
pub fn session_cookie(config: &GatewayConfig, value: String, secure: bool) -> Cookie<'static> {
    scoped_cookie(
        config.session_cookie.clone(),
        value,
        config.cookie_same_site,
        secure,
        CookieDuration::seconds(config.session_ttl.as_secs() as i64),
    )
}

/// An expired replacement that removes the state cookie.
pub fn clear_state_cookie(config: &GatewayConfig, secure: bool) -> Cookie<'static> {
    scoped_cookie(
        config.state_cookie.clone(),
        String::new(),
        config.cookie_same_site,
        secure,
        CookieDuration::seconds(0),
    )
}

/// An expired replacement that removes the session cookie.
pub fn clear_session_cookie(config: &GatewayConfig, secure: bool) -> Cookie<'static> {
    scoped_cookie(
        config.session_cookie.clone(),
        String::new(),
        config.cookie_same_site,
        secure,
        CookieDuration::seconds(0),
    )
}

fn scoped_cookie(
    name: String,
    value: String,
    same_site: SameSite,
    secure: bool,
    max_age: CookieDuration,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .path("/")
        .same_site(same_site)
        // SameSite=None is only honored by browsers on Secure cookies.
        .secure(secure || same_site == SameSite::None)
        .max_age(max_age)
        .build()
}

/// External origin the browser used to reach the gateway.
///
/// With `trust_proxy_headers` enabled the `x-forwarded-proto` and
/// `x-forwarded-host` values win (first element when comma-joined);
/// otherwise the raw `Host` header and plain `http` are used.
pub fn external_origin(config: &GatewayConfig, headers: &HeaderMap) -> (String, String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    };

    let raw_host = header("host").unwrap_or_else(|| config.bind_addr.to_string());
    if config.trust_proxy_headers {
        let proto = header("x-forwarded-proto").unwrap_or_else(|| "http".into());
        let host = header("x-forwarded-host").unwrap_or(raw_host);
        (proto, host)
    } else {
        ("http".into(), raw_host)
    }
}

/// Collapse a client-supplied return path to a safe same-origin relative
/// path. Absolute URLs, protocol-relative URLs and anything not starting
/// with a single `/` fall back to `/`.
pub fn sanitize_return_to(raw: Option<&str>) -> String {
    match raw {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.contains('\u{0}') =>
        {
            path.to_owned()
        }
        _ => "/".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_return_to() {
        assert_eq!(sanitize_return_to(Some("/app/dashboard?tab=1")), "/app/dashboard?tab=1");
        assert_eq!(sanitize_return_to(Some("/")), "/");
        assert_eq!(sanitize_return_to(Some("https://evil.example.com/")), "/");
        assert_eq!(sanitize_return_to(Some("//evil.example.com")), "/");
        assert_eq!(sanitize_return_to(Some("/\\evil.example.com")), "/");
        assert_eq!(sanitize_return_to(Some("relative/path")), "/");
        assert_eq!(sanitize_return_to(Some("")), "/");
        assert_eq!(sanitize_return_to(None), "/");
    }

    #[test]
    fn test_same_site_none_forces_secure() {
        let cookie = scoped_cookie(
            "c".into(),
            "v".into(),
            SameSite::None,
            false,
            CookieDuration::seconds(60),
        );
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = scoped_cookie(
            "c".into(),
            String::new(),
            SameSite::Lax,
            true,
            CookieDuration::seconds(0),
        );
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(0)));
        assert_eq!(cookie.value(), "");
    }
}
