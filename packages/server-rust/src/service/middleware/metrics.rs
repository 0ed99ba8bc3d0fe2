//! Metrics middleware for RPC calls.
//!
//! Wraps each call in a `tracing` span and feeds call counts and durations to
//! the `metrics` facade. Which recorder (if any) receives them is up to the
//! binary.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use dynrpc_core::{CODE_FAILURE, CODE_INFO, CODE_SUCCESS};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::context::DispatchContext;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer recording timing and outcome of every call.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<DispatchContext> for MetricsService<S>
where
    S: Service<DispatchContext, Response = DispatchContext, Error = Infallible> + Send,
    S::Future: Send + 'static,
{
    type Response = DispatchContext;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchContext, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, ctx: DispatchContext) -> Self::Future {
        let target = ctx.target.short_name().to_string();
        let action = ctx.method.name().to_string();

        let span = info_span!(
            "rpc_call",
            request_id = %ctx.request_id,
            service = %target,
            action = %action,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(ctx);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(ctx) => outcome_label(ctx.response.code),
                    Err(never) => match *never {},
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    "dynrpc_calls_total",
                    "service" => target.clone(),
                    "action" => action.clone(),
                    "outcome" => outcome,
                )
                .increment(1);
                metrics::histogram!(
                    "dynrpc_call_duration_seconds",
                    "service" => target,
                    "action" => action,
                )
                .record(elapsed.as_secs_f64());

                tracing::debug!(duration_ms, outcome, "rpc call complete");

                result
            }
            .instrument(span),
        )
    }
}

fn outcome_label(code: i32) -> &'static str {
    match code {
        CODE_SUCCESS => "ok",
        CODE_INFO => "info",
        CODE_FAILURE => "failure",
        _ => "other",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::invoker::Invoker;
    use crate::service::middleware::testing::sample_context;

    #[tokio::test]
    async fn metrics_layer_passes_through_response() {
        let svc = MetricsLayer.layer(Invoker::default());
        let ctx = svc.oneshot(sample_context()).await.unwrap();
        assert_eq!(ctx.response.code, CODE_SUCCESS);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome_label(CODE_SUCCESS), "ok");
        assert_eq!(outcome_label(CODE_FAILURE), "failure");
        assert_eq!(outcome_label(7), "other");
    }
}
