//! Random material for the authorization flow: `state`, `nonce` and PKCE
//! verifier/challenge pairs.
//!
//! All values are base64url without padding, which keeps them safe for query
//! strings and cookie values as-is.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate an unguessable `state` value (32 random bytes, 43 characters).
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe(32)
}

/// Generate an ID-token `nonce` (32 random bytes, 43 characters).
#[must_use]
pub fn generate_nonce() -> String {
    random_urlsafe(32)
}

/// Generate a PKCE code verifier.
///
/// 96 random bytes encode to 128 characters, the maximum verifier length
/// RFC 7636 allows. The base64url alphabet is a subset of the unreserved
/// characters the RFC permits.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_urlsafe(96)
}

/// Derive the S256 code challenge for a verifier:
/// `base64url(sha256(ascii(verifier)))`.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_and_nonce_lengths() {
        assert_eq!(generate_state().len(), 43);
        assert_eq!(generate_nonce().len(), 43);
    }

    #[test]
    fn test_code_verifier_length() {
        assert_eq!(generate_code_verifier().len(), 128);
    }

    #[test]
    fn test_values_are_unique() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(generate_code_verifier(), generate_code_verifier());
    }

    #[test]
    fn test_code_challenge_known_vector() {
        // Appendix B of RFC 7636.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_values_are_urlsafe() {
        let verifier = generate_code_verifier();
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }
}
