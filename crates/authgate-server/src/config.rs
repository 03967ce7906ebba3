//! Gateway configuration, built once at startup from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use cookie::SameSite;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

/// Immutable gateway configuration. Built in `main` and shared by `Arc`;
/// nothing reads the environment after startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// OIDC issuer, origin plus base path.
    pub issuer_url: Url,
    pub client_id: String,
    pub client_secret: String,
    /// Space-separated scopes requested on login.
    pub scopes: String,
    /// HMAC secret for the state and session cookies.
    pub session_secret: String,
    pub session_cookie: String,
    pub state_cookie: String,
    pub session_ttl: Duration,
    pub state_ttl: Duration,
    pub cookie_same_site: SameSite,
    /// Honor `x-forwarded-host`/`x-forwarded-proto` when resolving the
    /// gateway's external origin. Only enable behind a trusted proxy.
    pub trust_proxy_headers: bool,
    /// CORS allowlist. Empty disables CORS handling entirely.
    pub allowed_origins: Vec<String>,
    /// Gateway path prefix tunneled to the IdP, e.g. `/oidc`.
    pub proxy_prefix: String,
    pub bind_addr: SocketAddr,
}

impl GatewayConfig {
    /// Read configuration from the environment. Missing required variables
    /// and unparseable values are fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let issuer_url = parse_var("OIDC_ISSUER_URL", required("OIDC_ISSUER_URL")?)?;
        let client_id = required("OIDC_CLIENT_ID")?;
        let client_secret = required("OIDC_CLIENT_SECRET")?;
        let session_secret = required("BFF_SESSION_SECRET")?;
        if session_secret.len() < 32 {
            return Err(ConfigError::InvalidVar {
                name: "BFF_SESSION_SECRET",
                reason: "must be at least 32 bytes".into(),
            });
        }

        let scopes = optional("OIDC_DEFAULT_SCOPES")
            .unwrap_or_else(|| "openid profile email offline_access".to_owned());
        let session_cookie = optional("BFF_SESSION_COOKIE").unwrap_or_else(|| "bff_session".into());
        let state_cookie = optional("BFF_STATE_COOKIE").unwrap_or_else(|| "bff_auth_state".into());

        let session_ttl = Duration::from_secs(parse_or("BFF_SESSION_TTL", 86_400)?);
        let state_ttl = Duration::from_secs(parse_or("BFF_STATE_TTL", 300)?);

        let cookie_same_site = match optional("BFF_COOKIE_SAMESITE")
            .unwrap_or_else(|| "lax".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "lax" => SameSite::Lax,
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            other => {
                return Err(ConfigError::InvalidVar {
                    name: "BFF_COOKIE_SAMESITE",
                    reason: format!("expected lax, strict or none, got {other}"),
                });
            }
        };

        let trust_proxy_headers = parse_or("BFF_TRUST_PROXY_HEADERS", false)?;
        let allowed_origins = optional("BFF_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_owned())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let proxy_prefix = normalize_prefix(optional("BFF_PROXY_PREFIX").unwrap_or_else(|| "/oidc".into()))?;
        let bind_addr = parse_var("BFF_BIND_ADDR", optional("BFF_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()))?;

        Ok(Self {
            issuer_url,
            client_id,
            client_secret,
            scopes,
            session_secret,
            session_cookie,
            state_cookie,
            session_ttl,
            state_ttl,
            cookie_same_site,
            trust_proxy_headers,
            allowed_origins,
            proxy_prefix,
            bind_addr,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        name,
        reason: e.to_string(),
    })
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => parse_var(name, raw),
        None => Ok(default),
    }
}

fn normalize_prefix(raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || !trimmed.starts_with('/') {
        return Err(ConfigError::InvalidVar {
            name: "BFF_PROXY_PREFIX",
            reason: "must be a non-empty path starting with /".into(),
        });
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/oidc".into()).unwrap(), "/oidc");
        assert_eq!(normalize_prefix("/oidc/".into()).unwrap(), "/oidc");
        assert!(normalize_prefix("oidc".into()).is_err());
        assert!(normalize_prefix("/".into()).is_err());
        assert!(normalize_prefix("".into()).is_err());
    }
}
