//! Token issuance, validation and payload retrieval.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cache::ExpiringCache;
use super::cipher::{digest_hex, digest_matches, PayloadCipher};
use super::config::TokenConfig;
use super::errors::TokenError;

/// Claims carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    iss: String,
    aud: String,
    iat: u64,
    exp: u64,
    /// Hex SHA-256 of the serialized payload.
    digest: String,
    /// Encrypted serialized payload.
    data: String,
}

#[derive(Debug, Clone)]
struct CachedPayload {
    digest: String,
    value: Value,
}

/// Issues and checks compact tokens.
///
/// Two expiring caches sit in front of the cryptography, both keyed by the
/// token minus its header segment: one records validated tokens (with their
/// digest), the other decrypted payloads. Entries live until the token's own
/// expiry, so an expired token always takes the full verification path and
/// fails it.
pub struct TokenService {
    config: TokenConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    cipher: PayloadCipher,
    validated: ExpiringCache<String>,
    payloads: ExpiringCache<CachedPayload>,
}

impl TokenService {
    /// # Errors
    ///
    /// Returns [`TokenError::UnsupportedAlgorithm`] for non-HMAC algorithms and
    /// [`TokenError::MissingSecret`] when either secret is empty.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        if !matches!(
            config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::UnsupportedAlgorithm(config.algorithm));
        }
        if config.signing_secret.is_empty() {
            return Err(TokenError::MissingSecret("signing secret"));
        }
        if config.encryption_secret.is_empty() {
            return Err(TokenError::MissingSecret("encryption secret"));
        }

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = 0;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            cipher: PayloadCipher::from_secret(&config.encryption_secret)?,
            validation,
            config,
            validated: ExpiringCache::new(),
            payloads: ExpiringCache::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issues a token carrying `payload` and seeds both caches with it.
    ///
    /// # Errors
    ///
    /// Fails when the payload cannot be serialized, encrypted or signed.
    pub fn issue<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String, TokenError> {
        let value = serde_json::to_value(payload)?;
        let serialized = serde_json::to_vec(&value)?;
        let digest = digest_hex(&serialized);

        let iat = unix_now();
        let exp = iat.saturating_add(self.config.ttl.as_secs());
        let claims = Claims {
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat,
            exp,
            digest: digest.clone(),
            data: self.cipher.encrypt(&serialized)?,
        };
        let token = encode(&Header::new(self.config.algorithm), &claims, &self.encoding)?;

        let key = cache_key(&token).ok_or(TokenError::Malformed)?;
        let ttl = remaining_lifetime(exp);
        self.validated.insert(key, digest.clone(), ttl);
        self.payloads.insert(key, CachedPayload { digest, value }, ttl);
        tracing::debug!(exp, "token issued");
        Ok(token)
    }

    /// Whether `token` is authentic, addressed to this service and unexpired.
    ///
    /// A previously validated token is accepted from cache without repeating
    /// any cryptographic work.
    #[must_use]
    pub fn validate(&self, token: &str) -> bool {
        let Some(key) = cache_key(token) else {
            return false;
        };
        if self.validated.contains(key) {
            return true;
        }
        match self.verify(token) {
            Ok(claims) => {
                self.validated
                    .insert(key, claims.digest, remaining_lifetime(claims.exp));
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "token validation failed");
                false
            }
        }
    }

    /// Payload of a valid token as JSON. `None` when the token does not
    /// validate or its payload cannot be opened.
    #[must_use]
    pub fn retrieve_value(&self, token: &str) -> Option<Value> {
        if !self.validate(token) {
            return None;
        }
        let key = cache_key(token)?;

        if let Some(cached) = self.payloads.get(key) {
            let digest = self.validated.get(key)?;
            if !digest_matches(&digest, &cached.digest) {
                tracing::warn!("cached payload digest does not match validated token");
                return None;
            }
            return Some(cached.value);
        }

        let claims = self.verify(token).ok()?;
        let ttl = remaining_lifetime(claims.exp);
        match self
            .payloads
            .get_or_try_insert_with(key, ttl, || self.open(&claims))
        {
            Ok(cached) => Some(cached.value),
            Err(err) => {
                tracing::debug!(error = %err, "token payload could not be opened");
                None
            }
        }
    }

    /// Payload of a valid token deserialized as `T`.
    #[must_use]
    pub fn retrieve<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        self.retrieve_value(token)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Evicts expired entries from both caches; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.validated.purge_expired() + self.payloads.purge_expired()
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)?.claims;
        if claims.exp <= unix_now() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn open(&self, claims: &Claims) -> Result<CachedPayload, TokenError> {
        let plaintext = self.cipher.decrypt(&claims.data)?;
        if !digest_matches(&claims.digest, &digest_hex(&plaintext)) {
            return Err(TokenError::DigestMismatch);
        }
        Ok(CachedPayload {
            digest: claims.digest.clone(),
            value: serde_json::from_slice(&plaintext)?,
        })
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .field("validated", &self.validated.len())
            .field("payloads", &self.payloads.len())
            .finish_non_exhaustive()
    }
}

/// The token without its header segment, i.e. `payload.signature`.
fn cache_key(token: &str) -> Option<&str> {
    let (_, rest) = token.split_once('.')?;
    (rest.matches('.').count() == 1).then_some(rest)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn remaining_lifetime(exp: u64) -> Duration {
    (UNIX_EPOCH + Duration::from_secs(exp))
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
