//! Token issuance errors.
//!
//! Only issuance and construction report errors. Validation and payload
//! retrieval collapse every failure into `false` / `None`.

use jsonwebtoken::Algorithm;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("algorithm {0:?} is not supported; use HS256, HS384 or HS512")]
    UnsupportedAlgorithm(Algorithm),

    #[error("{0} must not be empty")]
    MissingSecret(&'static str),

    #[error("payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("payload encryption failed")]
    Cipher,

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("token is malformed")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("payload digest does not match")]
    DigestMismatch,
}
