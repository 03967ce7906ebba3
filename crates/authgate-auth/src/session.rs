//! Server-side session store.
//!
//! The browser holds only a signed session identifier (`{id}.{sig}` where
//! `sig` is base64url HMAC-SHA256 over the id). Tokens and user claims stay
//! in this process. Sessions use a sliding TTL: every token refresh pushes
//! the deadline out, and expired entries are dropped lazily on access plus
//! an opportunistic sweep on create.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::cookie::{sign, verify};
use crate::now_unix_ms;
use crate::tokens::SessionTokens;

/// One authenticated browser session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    /// The `sub` claim when the IdP provided one.
    pub subject: Option<String>,
    pub tokens: SessionTokens,
    /// Claims from the ID token and/or userinfo endpoint, as returned by
    /// the IdP.
    pub user_info: Value,
    pub created_at: i64,
    pub updated_at: i64,
    /// Sliding deadline in epoch milliseconds. Independent of the access
    /// token expiry inside `tokens`.
    pub expires_at: i64,
}

/// Concurrent session map plus the secret used to sign session cookies.
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
    secret: Vec<u8>,
    ttl_ms: i64,
}

impl SessionStore {
    /// Create a store whose sessions idle out after `ttl`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            secret: secret.into(),
            ttl_ms: ttl.as_millis() as i64,
        }
    }

    /// Mint a new session for freshly exchanged tokens.
    pub fn create(
        &self,
        tokens: SessionTokens,
        user_info: Value,
        subject: Option<String>,
    ) -> SessionRecord {
        self.purge_expired();
        let now = now_unix_ms();
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            subject,
            tokens,
            user_info,
            created_at: now,
            updated_at: now,
            expires_at: now + self.ttl_ms,
        };
        self.sessions.insert(record.id.clone(), record.clone());
        record
    }

    /// Signed cookie value for a session id.
    #[must_use]
    pub fn cookie_value(&self, session_id: &str) -> String {
        let sig = URL_SAFE_NO_PAD.encode(sign(session_id.as_bytes(), &self.secret));
        format!("{session_id}.{sig}")
    }

    /// Look up a session by id.
    ///
    /// Expired sessions are removed on the spot and reported as absent.
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        let now = now_unix_ms();
        {
            let entry = self.sessions.get(session_id)?;
            if entry.expires_at > now {
                return Some(entry.clone());
            }
        }
        // Deadline passed; drop the entry outside the map guard.
        self.sessions.remove(session_id);
        tracing::debug!(session_id, "Removed expired session");
        None
    }

    /// Verify a session cookie value and resolve its session.
    ///
    /// Forged or malformed values behave exactly like an absent cookie.
    pub fn get_from_cookie(&self, cookie_value: &str) -> Option<SessionRecord> {
        let session_id = self.verify_cookie(cookie_value)?;
        self.get(&session_id)
    }

    /// Replace a session's tokens after a refresh, keeping the previous
    /// refresh token when the IdP omitted a new one. Slides the deadline.
    pub fn update_tokens(&self, session_id: &str, tokens: SessionTokens) -> Option<SessionRecord> {
        let now = now_unix_ms();
        let mut entry = self.sessions.get_mut(session_id)?;
        entry.tokens = entry.tokens.merged_with(tokens);
        entry.updated_at = now;
        entry.expires_at = now + self.ttl_ms;
        Some(entry.clone())
    }

    /// Replace the cached user claims for a session.
    pub fn update_user_info(&self, session_id: &str, user_info: Value) -> Option<SessionRecord> {
        let mut entry = self.sessions.get_mut(session_id)?;
        entry.user_info = user_info;
        entry.updated_at = now_unix_ms();
        Some(entry.clone())
    }

    /// Remove a session. Returns the record if one existed.
    pub fn delete(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.remove(session_id).map(|(_, record)| record)
    }

    /// Number of sessions currently held, including any not-yet-swept
    /// expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn verify_cookie(&self, cookie_value: &str) -> Option<String> {
        let (session_id, sig) = cookie_value.split_once('.')?;
        if session_id.is_empty() {
            return None;
        }
        let signature = URL_SAFE_NO_PAD.decode(sig).ok()?;
        verify(session_id.as_bytes(), &self.secret, &signature).then(|| session_id.to_owned())
    }

    fn purge_expired(&self) {
        let now = now_unix_ms();
        self.sessions.retain(|_, record| record.expires_at > now);
    }
}
