//! Network module with deferred startup lifecycle.
//!
//! `new()` wires the dispatcher into shared state, `start()` binds the TCP
//! listener, and `serve()` accepts connections until shutdown. Binding before
//! serving lets the binary learn the OS-assigned port first.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::middleware::from_fn_with_state;
use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, readiness_handler, rpc_handler, rpc_middleware, AppState,
};
use super::lifecycle::ServerLifecycle;
use super::middleware::{build_host_layers, build_http_layers};
use crate::service::Dispatcher;

/// Owns the listener and the HTTP surface around a [`Dispatcher`].
pub struct NetworkModule {
    config: NetworkConfig,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Arc<ServerLifecycle>,
    start_time: Instant,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            lifecycle: Arc::new(ServerLifecycle::new()),
            start_time: Instant::now(),
            listener: None,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<ServerLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    fn state(&self) -> AppState {
        AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            lifecycle: Arc::clone(&self.lifecycle),
            start_time: self.start_time,
            max_body_bytes: self.config.max_body_bytes,
            request_timeout: self.config.request_timeout,
        }
    }

    /// Middleware mode: layers RPC dispatch over `host`.
    ///
    /// POST requests to the registry's route prefix are dispatched; anything
    /// else reaches `host` (or its fallback) behind the host timeout and body
    /// limit. Adds:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    pub fn build_router(&self, host: Router) -> Router {
        let state = self.state();
        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .with_state(state.clone())
            .merge(host)
            .layer(build_host_layers(&self.config))
            .layer(from_fn_with_state(state, rpc_middleware))
            .layer(build_http_layers(&self.config))
    }

    /// Endpoint mode: the route prefix accepts any method and treats every
    /// request as an RPC call.
    pub fn endpoint_router(&self) -> Router {
        let prefix = self.dispatcher.registry().route_prefix().to_string();
        Router::new()
            .route(&prefix, any(rpc_handler))
            .route("/health", get(health_handler))
            .with_state(self.state())
            .layer(build_http_layers(&self.config))
    }

    /// Binds the TCP listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves `host` in middleware mode until `shutdown` resolves, then
    /// refuses new RPC calls and waits up to `drain_timeout` for in-flight
    /// ones.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        host: Router,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router(host);
        let lifecycle = Arc::clone(&self.lifecycle);

        lifecycle.mark_ready();
        info!(prefix = %self.dispatcher.registry().route_prefix(), "serving RPC calls");

        let draining = Arc::clone(&lifecycle);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                draining.begin_drain();
            })
            .await?;

        if lifecycle.drain(self.config.drain_timeout).await {
            info!("all RPC calls drained");
        } else {
            warn!(
                remaining = lifecycle.active_calls(),
                "drain timeout expired with RPC calls in flight"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{DispatchConfig, ServerOptions, ServiceLocator};

    fn module() -> NetworkModule {
        let dispatcher = Dispatcher::new(
            ServerOptions::new().build(),
            Arc::new(ServiceLocator::new()),
            DispatchConfig::default(),
        );
        NetworkModule::new(NetworkConfig::default(), Arc::new(dispatcher))
    }

    #[test]
    fn new_does_not_bind() {
        let module = module();
        assert!(module.listener.is_none());
        assert!(Arc::ptr_eq(&module.lifecycle(), &module.lifecycle()));
    }

    #[test]
    fn routers_build() {
        let module = module();
        let _middleware = module.build_router(Router::new());
        let _endpoint = module.endpoint_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = module()
            .serve(Router::new(), std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("start() must be called"));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let mut module = module();
        module.start().await.unwrap();
        let lifecycle = module.lifecycle();
        module.serve(Router::new(), async {}).await.unwrap();
        assert_eq!(lifecycle.state(), crate::network::HealthState::Stopped);
    }
}
