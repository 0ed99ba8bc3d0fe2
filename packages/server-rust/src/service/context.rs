use std::sync::Arc;
use std::time::Instant;

use dynrpc_core::ResponseEnvelope;
use serde_json::Value;
use uuid::Uuid;

use super::descriptor::{MethodDescriptor, TypeDescriptor};
use super::registry::ServiceLocator;
use super::request::RpcRequest;

/// Per-call state passed through the filter pipeline.
///
/// Filters read the request and resolved method, may rewrite `args`, and may
/// set `response` and return without calling the next stage.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub request_id: Uuid,
    pub request: RpcRequest,
    pub response: ResponseEnvelope,
    pub target: Arc<TypeDescriptor>,
    pub method: Arc<MethodDescriptor>,
    /// Bound arguments in parameter order.
    pub args: Vec<Value>,
    pub locator: Arc<ServiceLocator>,
    started: Instant,
}

impl DispatchContext {
    #[must_use]
    pub fn new(
        request: RpcRequest,
        target: Arc<TypeDescriptor>,
        method: Arc<MethodDescriptor>,
        args: Vec<Value>,
        locator: Arc<ServiceLocator>,
        started: Instant,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request,
            response: ResponseEnvelope::default(),
            target,
            method,
            args,
            locator,
            started,
        }
    }

    /// Token presented with the request, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.request.token.as_deref()
    }

    /// Ends the call with `response`; the caller must not run the next stage.
    pub fn short_circuit(&mut self, response: ResponseEnvelope) {
        self.response = response;
    }

    #[must_use]
    pub fn elapsed_millis(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}
