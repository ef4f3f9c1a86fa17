use std::sync::Mutex;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::{IdentityError, Result};

/// Claims this crate cares about from an Apple identity token. Unknown
/// claims are ignored by `serde` rather than rejected.
#[derive(Debug, Deserialize)]
pub struct AppleClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

struct CachedKeys {
    keys: Vec<Jwk>,
    fetched_at: Instant,
}

/// Caches Apple's JWKS for `ttl`, refreshing once on a `kid` miss (§4.2).
/// One of the three mutex-guarded containers called out in §5.
pub struct JwksCache {
    ttl: Duration,
    jwks_url: String,
    http: reqwest::Client,
    cache: Mutex<Option<CachedKeys>>,
}

impl JwksCache {
    pub fn new(jwks_url: String, ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs.max(60)),
            jwks_url,
            http: reqwest::Client::new(),
            cache: Mutex::new(None),
        }
    }

    /// Verify `token`'s signature against the `kid` it declares, refreshing
    /// the cache once if the `kid` isn't present yet, then validate
    /// `iss`/`aud`/`sub` per §4.2.
    pub async fn verify(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audiences: &[String],
    ) -> Result<AppleClaims> {
        let header = decode_header(token)
            .map_err(|e| IdentityError::UpstreamTokenInvalid(format!("bad header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::UpstreamTokenInvalid(
                "alg must be RS256".to_string(),
            ));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::UpstreamTokenInvalid("missing kid".to_string()))?;

        let mut decoding_key = self.find_key(&kid).await?;
        if decoding_key.is_none() {
            self.refresh().await?;
            decoding_key = self.find_key(&kid).await?;
        }
        let decoding_key = decoding_key
            .ok_or_else(|| IdentityError::UpstreamTokenInvalid(format!("unknown kid {kid}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(expected_audiences);
        validation.set_issuer(&[expected_issuer]);
        let data = decode::<AppleClaims>(token, &decoding_key, &validation)
            .map_err(|e| IdentityError::UpstreamTokenInvalid(format!("signature/claims: {e}")))?;

        if data.claims.sub.is_empty() {
            return Err(IdentityError::UpstreamTokenInvalid(
                "empty sub".to_string(),
            ));
        }
        Ok(data.claims)
    }

    async fn find_key(&self, kid: &str) -> Result<Option<DecodingKey>> {
        let fresh = {
            let guard = self.cache.lock().unwrap();
            match guard.as_ref() {
                Some(c) if c.fetched_at.elapsed() < self.ttl => Some(c.keys.iter().find(|k| k.kid == kid).map(jwk_to_key)),
                _ => None,
            }
        };
        match fresh {
            Some(found) => found.transpose(),
            None => Ok(None),
        }
    }

    async fn refresh(&self) -> Result<()> {
        let body = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| IdentityError::UpstreamTokenInvalid(format!("jwks fetch: {e}")))?
            .json::<JwkSet>()
            .await
            .map_err(|e| IdentityError::UpstreamTokenInvalid(format!("jwks decode: {e}")))?;
        let mut guard = self.cache.lock().unwrap();
        *guard = Some(CachedKeys {
            keys: body.keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}

fn jwk_to_key(jwk: &Jwk) -> Result<DecodingKey> {
    DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
        .map_err(|e| IdentityError::UpstreamTokenInvalid(format!("bad jwk: {e}")))
}
