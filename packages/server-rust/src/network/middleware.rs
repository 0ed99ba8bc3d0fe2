//! HTTP-level Tower layers wrapped around the RPC host router.
//!
//! Ordering is outer-to-inner: the first layer listed sees the request first
//! and the response last.

use axum::extract::DefaultBodyLimit;
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// The composed layer type produced by [`build_http_layers`].
type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        CorsLayer,
        Stack<
            TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
            Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
        >,
    >,
>;

/// The composed layer type produced by [`build_host_layers`].
type HostLayers = Stack<DefaultBodyLimit, Stack<TimeoutLayer, Identity>>;

/// Builds the HTTP middleware stack shared by RPC calls and host routes.
///
/// **Outermost to innermost:**
/// 1. `SetRequestId` -- UUID v4 `X-Request-Id` on every request
/// 2. `Tracing` -- request/response trace spans
/// 3. `CORS` -- configured origins, GET and POST
/// 4. `PropagateRequestId` -- echoes `X-Request-Id` on the response
///
/// Nothing here answers on its own, so recognized RPC calls keep their
/// HTTP 200 envelope. RPC-level concerns (deadline, body size, metrics, auth,
/// caching) live in the dispatch path.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            x_request_id.clone(),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// Limits applied only to requests that fall through to the host router.
///
/// 1. `Timeout` -- 408 after `request_timeout`
/// 2. `DefaultBodyLimit` -- caps body extractors at `max_body_bytes`
#[must_use]
pub fn build_host_layers(config: &NetworkConfig) -> HostLayers {
    ServiceBuilder::new()
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .into_inner()
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
