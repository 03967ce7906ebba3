//! Short-lived store for authorizations that have been issued but whose
//! callback has not yet arrived.
//!
//! Keyed by the `state` value. Entries are single-use: a successful lookup
//! removes the entry atomically, so a replayed callback with the same
//! `state` always misses. Expiry is opportunistic (swept on insert) with a
//! hard re-check on consume, so a stale entry can occupy memory briefly but
//! can never be redeemed.

use std::time::Duration;

use dashmap::DashMap;

use crate::now_unix_ms;

/// PKCE material and redirect target captured when a login was initiated.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    /// Relative path the browser returns to after the callback completes.
    pub redirect_target: String,
    /// Epoch milliseconds at which the entry was stored.
    pub created_at: i64,
}

/// Concurrent map of in-flight authorizations.
pub struct PendingStore {
    entries: DashMap<String, PendingAuthorization>,
    ttl_ms: i64,
}

impl PendingStore {
    /// Create a store whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms: ttl.as_millis() as i64,
        }
    }

    /// Record a new pending authorization under its `state`.
    ///
    /// Sweeps expired entries first so the map does not grow across bursts
    /// of abandoned logins.
    pub fn put(&self, pending: PendingAuthorization) {
        self.purge_expired();
        self.entries.insert(pending.state.clone(), pending);
    }

    /// Atomically remove and return the entry for `state`.
    ///
    /// Returns `None` for unknown states and for entries that outlived the
    /// TTL, even if the sweep has not caught them yet.
    pub fn consume(&self, state: &str) -> Option<PendingAuthorization> {
        let (_, pending) = self.entries.remove(state)?;
        if now_unix_ms() - pending.created_at >= self.ttl_ms {
            tracing::debug!(state, "Discarding expired pending authorization");
            return None;
        }
        Some(pending)
    }

    /// Number of live entries, counting any not-yet-swept expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let now = now_unix_ms();
        self.entries
            .retain(|_, pending| now - pending.created_at < self.ttl_ms);
    }
}
