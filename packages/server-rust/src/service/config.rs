use std::time::Duration;

/// Dispatcher-level configuration.
///
/// Controls how handler failures are reported and how the optional response
/// cache is sized.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// When set, handler failures report the full error chain instead of the
    /// root cause alone.
    pub development: bool,
    /// Maximum number of cached responses.
    pub response_cache_capacity: usize,
    /// How long a cached response stays fresh.
    pub response_cache_ttl: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            development: false,
            response_cache_capacity: 10_000,
            response_cache_ttl: Duration::from_secs(60),
        }
    }
}
