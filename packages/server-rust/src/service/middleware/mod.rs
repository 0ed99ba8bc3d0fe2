//! Tower middleware for the per-call pipeline.
//!
//! - [`filter`]: The `RpcFilter` contract and its Tower layer
//! - [`metrics`]: Call timing and counting via `tracing` spans and `metrics`
//! - [`response_cache`]: Opt-in caching of successful responses
//! - [`auth`]: Token gate for protected methods
//! - [`pipeline`]: Composes filters and the invoker into one service

pub mod auth;
pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod response_cache;

pub use auth::TokenAuthFilter;
pub use filter::{FilterDescriptor, FilterLayer, Next, PipelineService, RpcFilter};
pub use metrics::MetricsLayer;
pub use pipeline::build_pipeline;
pub use response_cache::{ResponseCache, ResponseCacheFilter};

#[cfg(test)]
pub(crate) use filter::testing;
