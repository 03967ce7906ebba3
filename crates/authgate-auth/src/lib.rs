//! Authorization flow and session lifecycle for the Authgate BFF gateway.
//!
//! This crate contains everything the gateway needs to terminate the
//! Authorization Code + PKCE flow on behalf of a browser:
//!
//! - [`cookie`] - tamper-evident signed cookie codec shared by the state and
//!   session cookies
//! - [`random`] - state/nonce/PKCE material generation
//! - [`pending`] - short-lived, single-use pending-authorization store
//! - [`session`] - server-side session store with sliding expiry
//! - [`refresh`] - refresh-ahead session resolution
//! - [`oidc`] - the OIDC client capability (discovery, code exchange,
//!   refresh grant, userinfo, revocation, end-session)
//!
//! The browser never sees IdP tokens; it holds a signed session cookie whose
//! identifier resolves against the in-process [`session::SessionStore`].

pub mod cookie;
pub mod discovery;
pub mod error;
mod jwks;
pub mod oidc;
pub mod pending;
pub mod random;
pub mod refresh;
pub mod session;
pub mod tokens;

pub use error::AuthError;

/// Current time as milliseconds since the Unix epoch.
///
/// All stores and token expiries in this crate use epoch milliseconds so that
/// cookie payloads serialize as plain integers.
#[must_use]
pub fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
