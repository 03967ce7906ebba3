//! Refresh-ahead session resolution.
//!
//! Every authenticated lookup goes through [`RefreshManager::resolve`]. If
//! the access token is inside the skew window and a refresh token exists,
//! the refresh grant runs before the request is served. A failed refresh or
//! an expired token with no way to refresh deletes the session: an
//! unrefreshable session is invalid, never served stale.
//!
//! Refreshes are not deduplicated across concurrent requests for the same
//! session; the IdP sees at most a handful of parallel refresh grants, which
//! providers tolerate. Stricter deployments can serialize per session id.

use std::sync::Arc;

use crate::now_unix_ms;
use crate::oidc::OidcClient;
use crate::session::{SessionRecord, SessionStore};
use crate::tokens::SessionTokens;

/// Refresh when the access token expires within this window.
pub const REFRESH_SKEW_MS: i64 = 30_000;

/// Why a lookup came back unauthenticated. Serialized into the 401 body so
/// frontends can distinguish "log in" from "session just died".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// No cookie, bad signature, unknown id or session-TTL expiry.
    MissingOrInvalidSession,
    /// The refresh grant failed; the session was deleted.
    RefreshFailed,
    /// The access token expired with no usable refresh token; the session
    /// was deleted.
    AccessTokenExpired,
}

impl UnauthenticatedReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingOrInvalidSession => "missing_or_invalid_session",
            Self::RefreshFailed => "refresh_failed",
            Self::AccessTokenExpired => "access_token_expired",
        }
    }
}

/// Outcome of resolving a session cookie.
pub enum SessionLookup {
    Authenticated(SessionRecord),
    Unauthenticated(UnauthenticatedReason),
}

/// Applies the refresh-ahead policy on top of the session store.
pub struct RefreshManager {
    sessions: Arc<SessionStore>,
    oidc: Arc<dyn OidcClient>,
}

impl RefreshManager {
    #[must_use]
    pub fn new(sessions: Arc<SessionStore>, oidc: Arc<dyn OidcClient>) -> Self {
        Self { sessions, oidc }
    }

    /// Resolve a session cookie value into an authenticated session,
    /// refreshing ahead of expiry when possible.
    pub async fn resolve(&self, cookie_value: Option<&str>) -> SessionLookup {
        let Some(value) = cookie_value else {
            return SessionLookup::Unauthenticated(UnauthenticatedReason::MissingOrInvalidSession);
        };
        let Some(mut session) = self.sessions.get_from_cookie(value) else {
            return SessionLookup::Unauthenticated(UnauthenticatedReason::MissingOrInvalidSession);
        };

        let now = now_unix_ms();
        let refresh_token = session.tokens.refresh_token.clone();
        if session.tokens.expires_within(now, REFRESH_SKEW_MS) {
            match refresh_token {
                Some(refresh_token) => {
                    match self.run_refresh(&session, &refresh_token).await {
                        Some(updated) => session = updated,
                        None => {
                            self.sessions.delete(&session.id);
                            return SessionLookup::Unauthenticated(
                                UnauthenticatedReason::RefreshFailed,
                            );
                        }
                    }
                }
                None => {
                    // Inside the skew window but not yet expired: keep
                    // serving until the token actually dies.
                    if session.tokens.is_expired(now) {
                        tracing::debug!(
                            session_id = %session.id,
                            "Access token expired with no refresh token"
                        );
                        self.sessions.delete(&session.id);
                        return SessionLookup::Unauthenticated(
                            UnauthenticatedReason::AccessTokenExpired,
                        );
                    }
                }
            }
        }

        // A refresh may have succeeded yet returned an already-dead token.
        if session.tokens.is_expired(now_unix_ms()) {
            self.sessions.delete(&session.id);
            return SessionLookup::Unauthenticated(UnauthenticatedReason::AccessTokenExpired);
        }
        SessionLookup::Authenticated(session)
    }

    async fn run_refresh(
        &self,
        session: &SessionRecord,
        refresh_token: &str,
    ) -> Option<SessionRecord> {
        tracing::debug!(session_id = %session.id, "Refreshing access token ahead of expiry");
        let normalized = match self.oidc.refresh(refresh_token).await {
            Ok(response) => match SessionTokens::normalize(response, now_unix_ms()) {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "Refresh response unusable");
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Token refresh failed");
                return None;
            }
        };
        let updated = self.sessions.update_tokens(&session.id, normalized);
        if updated.is_none() {
            // Session vanished mid-refresh (logout race).
            tracing::debug!(session_id = %session.id, "Session gone after refresh");
        }
        updated
    }
}
