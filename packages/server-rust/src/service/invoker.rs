//! Innermost pipeline stage: constructs the target and runs the handler.

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use dynrpc_core::ResponseEnvelope;
use futures_util::FutureExt as _;
use serde_json::Value;
use tower::Service;

use super::context::DispatchContext;
use super::descriptor::{Args, MethodHandler};

/// Tower service that invokes the resolved method and records its outcome in
/// the context response. Handler errors and panics become failure envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invoker {
    development: bool,
}

impl Invoker {
    /// In development mode failures report the full error chain.
    #[must_use]
    pub fn new(development: bool) -> Self {
        Self { development }
    }
}

impl Service<DispatchContext> for Invoker {
    type Response = DispatchContext;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchContext, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut ctx: DispatchContext) -> Self::Future {
        let development = self.development;
        Box::pin(async move {
            let outcome = invoke(&ctx).await;
            ctx.response = match outcome {
                Ok(data) => ResponseEnvelope::success(data),
                Err(err) => {
                    tracing::error!(
                        request_id = %ctx.request_id,
                        service = ctx.target.name(),
                        action = ctx.method.name(),
                        error = ?err,
                        "handler failed"
                    );
                    ResponseEnvelope::failure(render_error(&err, development))
                }
            };
            Ok(ctx)
        })
    }
}

async fn invoke(ctx: &DispatchContext) -> anyhow::Result<Value> {
    let constructor = ctx.target.sole_constructor().ok_or_else(|| {
        anyhow::anyhow!(
            "type `{}` declares {} constructors; exactly one is required",
            ctx.target.name(),
            ctx.target.constructor_count()
        )
    })?;
    let handler = ctx.method.handler_fn().cloned().ok_or_else(|| {
        anyhow::anyhow!(
            "method `{}` on type `{}` has no handler",
            ctx.method.name(),
            ctx.target.name()
        )
    })?;

    let instance = guard(|| constructor(ctx.locator.as_ref()))?;
    let args = Args::new(ctx.args.clone());
    match handler {
        MethodHandler::Sync(f) => guard(|| f(instance, args)),
        MethodHandler::Async(f) => {
            let fut = guard(|| Ok(f(instance, args)))?;
            AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
        }
    }
}

/// Runs `f`, turning a panic into an error.
fn guard<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
}

fn panic_error(payload: &(dyn Any + Send)) -> anyhow::Error {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("handler panicked: {detail}")
}

/// Root cause in production; the whole chain in development.
fn render_error(err: &anyhow::Error, development: bool) -> String {
    if development {
        format!("{err:#}")
    } else {
        err.root_cause().to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::Context as _;
    use dynrpc_core::{TypeShape, CODE_FAILURE, CODE_SUCCESS};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::service::descriptor::{MethodDescriptor, ParamDef, TypeDescriptor};
    use crate::service::registry::ServiceLocator;
    use crate::service::request::{Params, RpcRequest};

    struct Calculator {
        offset: i64,
    }

    fn calculator() -> TypeDescriptor {
        TypeDescriptor::named("math.Calculator")
            .constructor(|_| Ok(Calculator { offset: 10 }))
            .method(
                MethodDescriptor::new("Add")
                    .param(ParamDef::new("a", TypeShape::int()))
                    .handler(|this: &Calculator, args: Args| {
                        Ok(this.offset + args.get::<i64>(0)?)
                    }),
            )
            .method(
                MethodDescriptor::new("AddLater")
                    .param(ParamDef::new("a", TypeShape::int()))
                    .handler_async(|this: Arc<Calculator>, args: Args| async move {
                        tokio::task::yield_now().await;
                        Ok::<_, anyhow::Error>(this.offset + args.get::<i64>(0)?)
                    }),
            )
            .method(MethodDescriptor::new("Fail").handler(|_: &Calculator, _| {
                Err::<(), _>(anyhow::anyhow!("disk full")).context("saving ledger")
            }))
            .method(
                MethodDescriptor::new("Explode")
                    .handler(|_: &Calculator, _| -> anyhow::Result<()> { panic!("boom") }),
            )
    }

    fn context(ty: TypeDescriptor, action: &str, args: Vec<Value>) -> DispatchContext {
        let ty = Arc::new(ty);
        let method = ty
            .methods()
            .iter()
            .find(|m| m.name() == action)
            .cloned()
            .unwrap();
        let request = RpcRequest {
            interface: None,
            target: ty.name().to_string(),
            action: action.to_string(),
            params: Params::Positional(args.clone()),
            token: None,
            introspect: false,
        };
        DispatchContext::new(
            request,
            ty,
            method,
            args,
            Arc::new(ServiceLocator::new()),
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn sync_handler_success() {
        let ctx = context(calculator(), "Add", vec![json!(5)]);
        let ctx = Invoker::default().oneshot(ctx).await.unwrap();
        assert_eq!(ctx.response.code, CODE_SUCCESS);
        assert_eq!(ctx.response.data, json!(15));
    }

    #[tokio::test]
    async fn async_handler_is_awaited() {
        let ctx = context(calculator(), "AddLater", vec![json!(1)]);
        let ctx = Invoker::default().oneshot(ctx).await.unwrap();
        assert_eq!(ctx.response.data, json!(11));
    }

    #[tokio::test]
    async fn production_mode_reports_root_cause() {
        let ctx = context(calculator(), "Fail", vec![]);
        let ctx = Invoker::new(false).oneshot(ctx).await.unwrap();
        assert_eq!(ctx.response.code, CODE_FAILURE);
        assert_eq!(ctx.response.message, "disk full");
    }

    #[tokio::test]
    async fn development_mode_reports_chain() {
        let ctx = context(calculator(), "Fail", vec![]);
        let ctx = Invoker::new(true).oneshot(ctx).await.unwrap();
        assert!(ctx.response.message.contains("saving ledger"));
        assert!(ctx.response.message.contains("disk full"));
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let ctx = context(calculator(), "Explode", vec![]);
        let ctx = Invoker::default().oneshot(ctx).await.unwrap();
        assert_eq!(ctx.response.code, CODE_FAILURE);
        assert!(ctx.response.message.contains("boom"));
    }

    #[tokio::test]
    async fn constructor_errors_are_reported() {
        let ty = TypeDescriptor::named("a.Broken")
            .constructor(|locator: &ServiceLocator| {
                locator.require::<String>().map(|_| Calculator { offset: 0 })
            })
            .method(MethodDescriptor::new("Run").handler(|_: &Calculator, _| Ok(())));
        let ctx = context(ty, "Run", vec![]);
        let ctx = Invoker::default().oneshot(ctx).await.unwrap();
        assert_eq!(ctx.response.code, CODE_FAILURE);
        assert!(ctx.response.message.contains("has been provided"));
    }
}
