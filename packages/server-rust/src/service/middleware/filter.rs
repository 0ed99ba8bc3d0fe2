//! User-supplied filters wrapping method invocation.
//!
//! A filter receives the [`DispatchContext`] and a [`Next`] handle. Calling
//! [`Next::run`] continues down the pipeline; returning without calling it
//! short-circuits the call with whatever response the filter set.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};

use crate::service::context::DispatchContext;
use crate::service::descriptor::qualified_name;
use crate::service::registry::ServiceLocator;

/// Type-erased pipeline stage. Stages never fail: every outcome is a
/// response written into the context.
pub type PipelineService = BoxCloneService<DispatchContext, DispatchContext, Infallible>;

type FilterFactory = dyn Fn(&ServiceLocator) -> anyhow::Result<Arc<dyn RpcFilter>> + Send + Sync;

// ---------------------------------------------------------------------------
// RpcFilter
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RpcFilter: Send + Sync + 'static {
    async fn handle(&self, ctx: DispatchContext, next: Next) -> DispatchContext;
}

/// Remainder of the pipeline after the current filter.
pub struct Next {
    inner: PipelineService,
}

impl Next {
    pub fn new<S>(service: S) -> Self
    where
        S: Service<DispatchContext, Response = DispatchContext, Error = Infallible>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            inner: BoxCloneService::new(service),
        }
    }

    pub async fn run(self, ctx: DispatchContext) -> DispatchContext {
        match self.inner.oneshot(ctx).await {
            Ok(ctx) => ctx,
            Err(never) => match never {},
        }
    }
}

// ---------------------------------------------------------------------------
// FilterDescriptor
// ---------------------------------------------------------------------------

/// Registration record for a filter. Filters are created per call from the
/// locator, so a filter may hold per-request state.
#[derive(Clone)]
pub struct FilterDescriptor {
    name: String,
    factory: Arc<FilterFactory>,
}

impl FilterDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ServiceLocator) -> anyhow::Result<Arc<dyn RpcFilter>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Descriptor creating a fresh `F::default()` per call, named after `F`.
    #[must_use]
    pub fn of<F: RpcFilter + Default>() -> Self {
        Self::new(qualified_name::<F>(), |_| {
            Ok(Arc::new(F::default()) as Arc<dyn RpcFilter>)
        })
    }

    /// Descriptor sharing one filter instance across calls.
    pub fn shared(name: impl Into<String>, filter: Arc<dyn RpcFilter>) -> Self {
        Self::new(name, move |_| Ok(Arc::clone(&filter)))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instantiates the filter.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error, typically a missing locator dependency.
    pub fn create(&self, locator: &ServiceLocator) -> anyhow::Result<Arc<dyn RpcFilter>> {
        (self.factory)(locator)
    }
}

impl fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilterDescriptor").field(&self.name).finish()
    }
}

// ---------------------------------------------------------------------------
// FilterLayer
// ---------------------------------------------------------------------------

/// Tower layer running one [`RpcFilter`] in front of the inner service.
#[derive(Clone)]
pub struct FilterLayer {
    filter: Arc<dyn RpcFilter>,
}

impl FilterLayer {
    #[must_use]
    pub fn new(filter: Arc<dyn RpcFilter>) -> Self {
        Self { filter }
    }
}

impl<S> Layer<S> for FilterLayer {
    type Service = FilterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FilterService {
            filter: Arc::clone(&self.filter),
            inner,
        }
    }
}

// ---------------------------------------------------------------------------
// FilterService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FilterService<S> {
    filter: Arc<dyn RpcFilter>,
    inner: S,
}

impl<S> Service<DispatchContext> for FilterService<S>
where
    S: Service<DispatchContext, Response = DispatchContext, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = DispatchContext;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchContext, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of `inner` is driven by `Next::run` via `oneshot`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: DispatchContext) -> Self::Future {
        let filter = Arc::clone(&self.filter);
        let next = Next::new(self.inner.clone());
        Box::pin(async move { Ok(filter.handle(ctx, next).await) })
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
