//! Token issuance configuration.

use std::fmt;
use std::time::Duration;

use jsonwebtoken::Algorithm;

/// Signing, encryption and lifetime settings for [`TokenService`](super::TokenService).
///
/// The secrets default to empty; [`TokenService::new`](super::TokenService::new)
/// refuses to start without both.
#[derive(Clone)]
pub struct TokenConfig {
    /// Value of the `iss` claim; required to match on validation.
    pub issuer: String,
    /// Value of the `aud` claim; required to match on validation.
    pub audience: String,
    /// HMAC key material.
    pub signing_secret: String,
    /// Hashed into the AES-256-GCM payload key.
    pub encryption_secret: String,
    /// One of the HMAC algorithms (`HS256`, `HS384`, `HS512`).
    pub algorithm: Algorithm,
    /// Lifetime of issued tokens. Whole seconds.
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "dynrpc".to_string(),
            audience: "dynrpc-clients".to_string(),
            signing_secret: String::new(),
            encryption_secret: String::new(),
            algorithm: Algorithm::HS256,
            ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("signing_secret", &"<redacted>")
            .field("encryption_secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TokenConfig::default();
        assert_eq!(config.issuer, "dynrpc");
        assert_eq!(config.audience, "dynrpc-clients");
        assert_eq!(config.algorithm, Algorithm::HS256);
        assert_eq!(config.ttl, Duration::from_secs(7200));
        assert!(config.signing_secret.is_empty());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = TokenConfig {
            signing_secret: "hunter2".into(),
            encryption_secret: "swordfish".into(),
            ..TokenConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("swordfish"));
        assert!(rendered.contains("<redacted>"));
    }
}
