//! Pipeline composition: wraps the invoker with the call's filters.

use std::sync::Arc;

use tower::util::BoxCloneService;
use tower::{Layer, ServiceBuilder};

use super::filter::{FilterLayer, PipelineService, RpcFilter};
use super::metrics::MetricsLayer;
use crate::service::invoker::Invoker;

/// Build the per-call pipeline.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- records every call, short-circuited ones included
/// 2. `filters` in the given order; the first filter sees the call first
/// 3. `Invoker` -- constructs the target and runs the handler
#[must_use]
pub fn build_pipeline(filters: &[Arc<dyn RpcFilter>], invoker: Invoker) -> PipelineService {
    let mut service = BoxCloneService::new(invoker);
    for filter in filters.iter().rev() {
        service = BoxCloneService::new(FilterLayer::new(Arc::clone(filter)).layer(service));
    }
    BoxCloneService::new(ServiceBuilder::new().layer(MetricsLayer).service(service))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
