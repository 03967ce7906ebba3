//! Token endpoint response shapes and normalization into session state.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Raw body of a successful token endpoint response (code exchange or
/// refresh grant). `access_token` stays optional here so normalization owns
/// the missing-token failure instead of the deserializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenEndpointResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Structured OAuth error body returned by token and revocation endpoints.
#[derive(Debug, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Tokens held server-side for a session, with the relative `expires_in`
/// already converted to an absolute epoch-ms deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Token type as reported by the IdP, `Bearer` in practice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Absolute expiry of the access token in epoch milliseconds. `None`
    /// when the IdP did not report a lifetime; such tokens never count as
    /// expired locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl SessionTokens {
    /// Convert a raw token response into session tokens.
    ///
    /// Fails with [`AuthError::MissingAccessToken`] when the IdP answered
    /// 2xx without an access token, which some providers do on
    /// misconfigured grants.
    pub fn normalize(response: TokenEndpointResponse, now_ms: i64) -> Result<Self, AuthError> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingAccessToken)?;
        let expires_at = response
            .expires_in
            .map(|secs| now_ms + (secs as i64) * 1000);
        Ok(Self {
            access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            token_type: response.token_type,
            expires_at,
            scope: response.scope,
        })
    }

    /// Merge a refresh result over the current tokens. Providers may omit
    /// the refresh token, ID token or token type on rotation-free
    /// refreshes; the previous values are kept in that case.
    #[must_use]
    pub fn merged_with(&self, newer: SessionTokens) -> SessionTokens {
        SessionTokens {
            refresh_token: newer.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: newer.id_token.or_else(|| self.id_token.clone()),
            token_type: newer.token_type.or_else(|| self.token_type.clone()),
            ..newer
        }
    }

    /// True when the access token deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }

    /// True when the access token expires within `skew_ms` from `now_ms`.
    /// Already-expired tokens also report true.
    #[must_use]
    pub fn expires_within(&self, now_ms: i64, skew_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at - now_ms <= skew_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: Option<&str>, expires_in: Option<u64>) -> TokenEndpointResponse {
        TokenEndpointResponse {
            access_token: access.map(str::to_owned),
            token_type: Some("Bearer".into()),
            expires_in,
            refresh_token: Some("rt".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_converts_expires_in() {
        let tokens = SessionTokens::normalize(response(Some("at"), Some(300)), 1_000).unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.token_type.as_deref(), Some("Bearer"));
        assert_eq!(tokens.expires_at, Some(301_000));
    }

    #[test]
    fn test_normalize_without_lifetime() {
        let tokens = SessionTokens::normalize(response(Some("at"), None), 1_000).unwrap();
        assert_eq!(tokens.expires_at, None);
        assert!(!tokens.is_expired(i64::MAX - 1));
    }

    #[test]
    fn test_normalize_rejects_missing_access_token() {
        let err = SessionTokens::normalize(response(None, Some(300)), 0).unwrap_err();
        assert!(matches!(err, AuthError::MissingAccessToken));

        let err = SessionTokens::normalize(response(Some(""), Some(300)), 0).unwrap_err();
        assert!(matches!(err, AuthError::MissingAccessToken));
    }

    #[test]
    fn test_expiry_predicates() {
        let tokens = SessionTokens::normalize(response(Some("at"), Some(60)), 0).unwrap();
        assert!(!tokens.is_expired(59_999));
        assert!(tokens.is_expired(60_000));
        assert!(!tokens.expires_within(0, 30_000));
        assert!(tokens.expires_within(30_000, 30_000));
        assert!(tokens.expires_within(70_000, 30_000));
    }

    #[test]
    fn test_merge_keeps_previous_refresh_token() {
        let old = SessionTokens::normalize(response(Some("old"), Some(60)), 0).unwrap();
        let fresh = SessionTokens {
            access_token: "new".into(),
            refresh_token: None,
            id_token: None,
            token_type: None,
            expires_at: Some(120_000),
            scope: None,
        };
        let merged = old.merged_with(fresh);
        assert_eq!(merged.access_token, "new");
        assert_eq!(merged.refresh_token.as_deref(), Some("rt"));
        assert_eq!(merged.token_type.as_deref(), Some("Bearer"));
        assert_eq!(merged.expires_at, Some(120_000));
    }
}
