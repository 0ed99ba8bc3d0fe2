//! Payload encryption and digests.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::errors::TokenError;

const NONCE_LEN: usize = 12;

/// AES-256-GCM with a key derived from a shared secret.
///
/// Ciphertexts are `base64url(nonce || ciphertext || tag)` with a fresh random
/// 96-bit nonce per message.
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl PayloadCipher {
    /// Derives the 256-bit key as the SHA-256 of `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Cipher`] if the key cannot be initialised.
    pub fn from_secret(secret: &str) -> Result<Self, TokenError> {
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| TokenError::Cipher)?;
        Ok(Self { cipher })
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Cipher`] if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, TokenError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| TokenError::Cipher)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] for undecodable input and
    /// [`TokenError::Cipher`] when authentication fails.
    pub fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|_| TokenError::Malformed)?;
        if bytes.len() <= NONCE_LEN {
            return Err(TokenError::Malformed);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenError::Cipher)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Constant-time comparison of two hex digests.
#[must_use]
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}
