//! Request entry point tying validation, resolution, binding and the filter
//! pipeline together.

use std::sync::Arc;
use std::time::Instant;

use axum::http::Method;
use dynrpc_core::ResponseEnvelope;
use tower::ServiceExt;

use super::binder::bind;
use super::config::DispatchConfig;
use super::context::DispatchContext;
use super::descriptor::{MethodDescriptor, TypeDescriptor};
use super::errors::DispatchError;
use super::introspect::{describe_method, INTROSPECTION_MESSAGE};
use super::invoker::Invoker;
use super::middleware::{build_pipeline, ResponseCache, RpcFilter};
use super::registry::{Registry, ServiceLocator};
use super::request::validate_request;
use super::resolver::{resolve, Resolved};

/// Turns one HTTP method + body into one response envelope.
///
/// Shared across requests; all per-call state lives in the
/// [`DispatchContext`] built for each call.
pub struct Dispatcher {
    registry: Arc<Registry>,
    locator: Arc<ServiceLocator>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Creates a dispatcher. When the registry has response cache keys and the
    /// locator holds no [`ResponseCache`] yet, one is provided from `config`.
    #[must_use]
    pub fn new(registry: Registry, locator: Arc<ServiceLocator>, config: DispatchConfig) -> Self {
        if !registry.cache_keys().is_empty() && !locator.contains::<ResponseCache>() {
            locator.provide(ResponseCache::new(
                registry.cache_keys().clone(),
                config.response_cache_capacity,
                config.response_cache_ttl,
            ));
        }
        Self {
            registry: Arc::new(registry),
            locator,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn locator(&self) -> &Arc<ServiceLocator> {
        &self.locator
    }

    /// Dispatches one call. Never fails: every outcome is an envelope, with
    /// `time` set to the elapsed dispatch time.
    pub async fn dispatch(&self, method: &Method, body: &[u8]) -> ResponseEnvelope {
        let started = Instant::now();
        let mut response = self.run(method, body, started).await;
        response.elapsed_millis = started.elapsed().as_secs_f64() * 1000.0;
        response
    }

    async fn run(&self, method: &Method, body: &[u8], started: Instant) -> ResponseEnvelope {
        let request = match validate_request(method, body) {
            Ok(request) => request,
            Err(err) => return reject(&err),
        };

        let Resolved { target, method } = match resolve(&self.registry, &request) {
            Ok(resolved) => resolved,
            Err(err) => return reject(&err),
        };

        if request.introspect {
            return ResponseEnvelope::info(INTROSPECTION_MESSAGE, describe_method(&target, &method));
        }

        let args = match bind(&method, &request.params) {
            Ok(args) => args,
            Err(err) => return reject_resolved(&err, &target, &method),
        };

        let filters = match self.instantiate_filters(&target, &method) {
            Ok(filters) => filters,
            Err(err) => return reject_resolved(&err, &target, &method),
        };

        let ctx = DispatchContext::new(
            request,
            target,
            method,
            args,
            Arc::clone(&self.locator),
            started,
        );
        let pipeline = build_pipeline(&filters, Invoker::new(self.config.development));
        match pipeline.oneshot(ctx).await {
            Ok(ctx) => ctx.response,
            Err(never) => match never {},
        }
    }

    fn instantiate_filters(
        &self,
        target: &TypeDescriptor,
        method: &MethodDescriptor,
    ) -> Result<Vec<Arc<dyn RpcFilter>>, DispatchError> {
        self.registry
            .filters_for(target, method)
            .iter()
            .map(|descriptor| {
                descriptor
                    .create(&self.locator)
                    .map_err(|err| DispatchError::FilterCreation {
                        name: descriptor.name().to_string(),
                        message: format!("{err:#}"),
                    })
            })
            .collect()
    }
}

fn reject(err: &DispatchError) -> ResponseEnvelope {
    tracing::debug!(error = %err, "rpc call rejected");
    ResponseEnvelope::failure(err.to_string())
}

/// Rejects a call whose target was resolved. Binding failures carry the
/// method descriptor so the caller can see the expected parameters.
fn reject_resolved(
    err: &DispatchError,
    target: &TypeDescriptor,
    method: &MethodDescriptor,
) -> ResponseEnvelope {
    tracing::debug!(
        service = target.name(),
        action = method.name(),
        error = %err,
        "rpc call rejected"
    );
    if err.is_binding() {
        ResponseEnvelope::failure_with_data(err.to_string(), describe_method(target, method))
    } else {
        ResponseEnvelope::failure(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
