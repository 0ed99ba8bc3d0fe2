//! Compact signed tokens with an encrypted payload and a cache-accelerated
//! validation path.
//!
//! A token is a JWT whose claims carry the AES-GCM encrypted payload and its
//! SHA-256 digest. Validation and payload retrieval consult expiring caches
//! keyed by the token without its header segment before doing any
//! cryptographic work.

pub mod cache;
pub mod cipher;
pub mod config;
pub mod errors;
pub mod service;
pub mod sweeper;

pub use cache::ExpiringCache;
pub use cipher::PayloadCipher;
pub use config::TokenConfig;
pub use errors::TokenError;
pub use service::TokenService;
pub use sweeper::CacheSweeper;
