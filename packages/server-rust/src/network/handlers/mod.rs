//! axum handlers and the shared state they extract.

pub mod health;
pub mod rpc;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use rpc::{rpc_handler, rpc_middleware};

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::lifecycle::ServerLifecycle;
use crate::service::Dispatcher;

/// State carried through axum extractors. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub lifecycle: Arc<ServerLifecycle>,
    /// Used for uptime reporting.
    pub start_time: Instant,
    pub max_body_bytes: usize,
    /// Deadline for reading and dispatching one RPC call.
    pub request_timeout: Duration,
}
