//! Error taxonomy for the authorization flow.
//!
//! Callers branch on variants to decide between a user-facing failure
//! (invalid callback, tampered cookie) and an upstream problem (IdP
//! unreachable, bad token response).

use thiserror::Error;

/// Errors surfaced by the auth crate.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The incoming request is malformed (missing callback parameters,
    /// unparseable cookie value and so on).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The `state` in the callback does not match the signed state cookie.
    #[error("Callback state does not match the state cookie")]
    StateMismatch,

    /// The pending authorization for this `state` is unknown, expired or was
    /// already consumed. Replayed callbacks land here.
    #[error("Authorization state is unknown, expired or already used")]
    StateUnknown,

    /// The token endpoint answered 2xx but the body had no `access_token`.
    #[error("Token response did not include an access token")]
    MissingAccessToken,

    /// OIDC discovery could not be fetched or parsed.
    #[error("OIDC discovery failed: {0}")]
    DiscoveryFailed(String),

    /// The authorization-code exchange failed at the transport level.
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The refresh grant failed at the transport level.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The userinfo request failed or the endpoint is not advertised.
    #[error("Userinfo request failed: {0}")]
    UserinfoFailed(String),

    /// Token revocation failed at the transport level. Callers treat this
    /// as best-effort.
    #[error("Token revocation failed: {0}")]
    RevocationFailed(String),

    /// The RP-initiated logout call failed at the transport level. Callers
    /// treat this as best-effort.
    #[error("End-session request failed: {0}")]
    EndSessionFailed(String),

    /// The ID token signature, issuer, audience or expiry check failed.
    #[error("ID token validation failed: {0}")]
    IdTokenInvalid(String),

    /// The `nonce` claim in the ID token does not match the value bound to
    /// this authorization attempt.
    #[error("ID token nonce does not match the pending authorization")]
    NonceMismatch,

    /// The IdP returned a structured OAuth error body.
    #[error("Provider returned {error}: {description}")]
    Provider {
        error: String,
        description: String,
    },

    /// Signing or serializing a cookie payload failed.
    #[error("Cookie encoding failed: {0}")]
    CookieEncoding(String),
}

impl AuthError {
    /// Build a [`AuthError::Provider`] from an OAuth error body, tolerating a
    /// missing description.
    #[must_use]
    pub fn provider(error: impl Into<String>, description: Option<String>) -> Self {
        Self::Provider {
            error: error.into(),
            description: description.unwrap_or_default(),
        }
    }

    /// True when the error indicates tampering or replay rather than an
    /// operational failure. These map to 4xx responses.
    #[must_use]
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch | Self::StateUnknown | Self::NonceMismatch | Self::IdTokenInvalid(_)
        )
    }

    /// True when the failure originated at the IdP or on the wire to it.
    /// These map to 502 responses.
    #[must_use]
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryFailed(_)
                | Self::ExchangeFailed(_)
                | Self::RefreshFailed(_)
                | Self::UserinfoFailed(_)
                | Self::RevocationFailed(_)
                | Self::EndSessionFailed(_)
                | Self::Provider { .. }
        )
    }
}
