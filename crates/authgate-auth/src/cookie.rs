//! Tamper-evident signed cookie codec.
//!
//! Cookie values are `base64url(json)` + `"."` + `base64url(hmac-sha256)`,
//! both without padding. The payload is readable by anyone holding the
//! cookie; the signature only proves it was minted by this gateway. Secrets
//! never go into the payload.
//!
//! Decoding is deliberately forgiving: any structural or signature failure
//! yields `None` so callers treat a bad cookie exactly like an absent one.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

use crate::error::AuthError;
use crate::now_unix_ms;

type HmacSha256 = Hmac<Sha256>;

/// A payload wrapped with the timestamp at which it was signed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope<T> {
    pub payload: T,
    /// Epoch milliseconds at signing time. Used for age checks on decode.
    pub issued_at: i64,
}

impl<T> SignedEnvelope<T> {
    /// Wrap `payload` with the current timestamp.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            issued_at: now_unix_ms(),
        }
    }

    /// Age of the envelope in milliseconds, clamped to zero for clocks that
    /// moved backwards.
    #[must_use]
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.issued_at).max(0)
    }
}

impl<T: Serialize> SignedEnvelope<T> {
    /// Serialize and sign the envelope into a cookie value.
    pub fn encode(&self, secret: &[u8]) -> Result<String, AuthError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| AuthError::CookieEncoding(format!("serialize payload: {e}")))?;
        let body = URL_SAFE_NO_PAD.encode(&json);
        let sig = URL_SAFE_NO_PAD.encode(sign(body.as_bytes(), secret));
        Ok(format!("{body}.{sig}"))
    }
}

/// Decode and verify a signed cookie value.
///
/// Returns `None` on any failure: missing dot separator, invalid base64,
/// signature mismatch or a payload that does not deserialize into `T`.
#[must_use]
pub fn decode_signed_cookie<T: DeserializeOwned>(
    value: &str,
    secret: &[u8],
) -> Option<SignedEnvelope<T>> {
    let (body, sig) = value.split_once('.')?;
    if body.is_empty() || sig.is_empty() {
        return None;
    }
    let signature = URL_SAFE_NO_PAD.decode(sig).ok()?;
    if !verify(body.as_bytes(), secret, &signature) {
        return None;
    }
    let json = URL_SAFE_NO_PAD.decode(body).ok()?;
    serde_json::from_slice(&json).ok()
}

/// HMAC-SHA256 over `data`.
pub(crate) fn sign(data: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time signature comparison via the Mac implementation.
pub(crate) fn verify(data: &[u8], secret: &[u8], signature: &[u8]) -> bool {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(signature).is_ok()
}

/// Payload of the state cookie set when a login is initiated.
///
/// Carries the full PKCE material so the callback can cross-check the
/// pending-authorization store entry against what the browser presented.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCookiePayload {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    /// Relative path to send the browser to after a successful callback.
    pub redirect_target: String,
}
