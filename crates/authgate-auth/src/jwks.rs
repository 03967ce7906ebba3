//! Cached JWKS lookups for ID token signature validation.
//!
//! Keeps the provider's key set in memory for a fixed TTL and refetches
//! when a lookup misses, which covers routine key rotation without hitting
//! the JWKS endpoint on every callback.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use crate::error::AuthError;

pub(crate) struct JwksCache {
    ttl: Duration,
    cached: RwLock<Option<CachedJwks>>,
}

struct CachedJwks {
    uri: String,
    jwks: JwkSet,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_fresh(&self, uri: &str, ttl: Duration) -> bool {
        self.uri == uri && self.fetched_at.elapsed() < ttl
    }
}

impl JwksCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Resolve the decoding key for `kid`, refetching the key set when the
    /// cache is stale or the kid is unknown (key rotation).
    pub(crate) async fn decoding_key(
        &self,
        http: &reqwest::Client,
        jwks_uri: &str,
        kid: &str,
    ) -> Result<(DecodingKey, Option<Algorithm>), AuthError> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref()
                && cached.is_fresh(jwks_uri, self.ttl)
                && let Some(jwk) = cached.jwks.find(kid)
            {
                return key_from_jwk(jwk);
            }
        }

        let jwks = fetch_jwks(http, jwks_uri).await?;
        let result = match jwks.find(kid) {
            Some(jwk) => key_from_jwk(jwk),
            None => Err(AuthError::IdTokenInvalid(format!(
                "no key with kid {kid} in JWKS"
            ))),
        };
        let mut guard = self.cached.write().await;
        *guard = Some(CachedJwks {
            uri: jwks_uri.to_owned(),
            jwks,
            fetched_at: Instant::now(),
        });
        result
    }
}

async fn fetch_jwks(http: &reqwest::Client, jwks_uri: &str) -> Result<JwkSet, AuthError> {
    tracing::debug!(jwks_uri, "Fetching JWKS");
    let response = http
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| AuthError::IdTokenInvalid(format!("JWKS fetch failed: {e}")))?;
    if !response.status().is_success() {
        return Err(AuthError::IdTokenInvalid(format!(
            "JWKS endpoint returned HTTP {}",
            response.status()
        )));
    }
    response
        .json::<JwkSet>()
        .await
        .map_err(|e| AuthError::IdTokenInvalid(format!("invalid JWKS body: {e}")))
}

fn key_from_jwk(jwk: &Jwk) -> Result<(DecodingKey, Option<Algorithm>), AuthError> {
    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthError::IdTokenInvalid(format!("unusable JWK: {e}")))?;
    let algorithm = jwk.common.key_algorithm.and_then(jwk_algorithm);
    Ok((key, algorithm))
}

fn jwk_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
