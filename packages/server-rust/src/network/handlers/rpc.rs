//! RPC entry points: a pass-through middleware for host routers and a plain
//! handler for a dedicated endpoint.

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dynrpc_core::ResponseEnvelope;

use super::AppState;

pub const SHUTTING_DOWN: &str = "server is shutting down";
pub const BODY_UNREADABLE: &str = "request body could not be read";
pub const TIMED_OUT: &str = "request timed out";

/// Dispatches POST requests addressed to the route prefix and passes every
/// other request to the inner router unchanged.
///
/// Install with `axum::middleware::from_fn_with_state`.
pub async fn rpc_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let prefix = state.dispatcher.registry().route_prefix();
    if request.method() != Method::POST || !matches_route(request.uri().path(), prefix) {
        return next.run(request).await;
    }
    dispatch_request(&state, request).await
}

/// Treats every request as an RPC call; non-POST requests are answered with a
/// failure envelope.
pub async fn rpc_handler(State(state): State<AppState>, request: Request) -> Response {
    dispatch_request(&state, request).await
}

/// Recognized calls always answer HTTP 200 with an envelope, including when
/// the body is too large or the call overruns `request_timeout`.
async fn dispatch_request(state: &AppState, request: Request) -> Response {
    if !state.lifecycle.accepts_calls() {
        return Json(ResponseEnvelope::failure(SHUTTING_DOWN)).into_response();
    }
    let _guard = state.lifecycle.track_call();

    let response = tokio::time::timeout(state.request_timeout, read_and_dispatch(state, request))
        .await
        .unwrap_or_else(|_| {
            tracing::warn!(timeout = ?state.request_timeout, "rpc call timed out");
            ResponseEnvelope::failure(TIMED_OUT)
        });
    Json(response).into_response()
}

async fn read_and_dispatch(state: &AppState, request: Request) -> ResponseEnvelope {
    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => state.dispatcher.dispatch(&parts.method, &bytes).await,
        Err(err) => {
            tracing::debug!(error = %err, "rpc body rejected");
            ResponseEnvelope::failure(BODY_UNREADABLE)
        }
    }
}

/// Path equality ignoring ASCII case and trailing slashes.
fn matches_route(path: &str, prefix: &str) -> bool {
    path.trim_end_matches('/')
        .eq_ignore_ascii_case(prefix.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_matching() {
        assert!(matches_route("/", "/"));
        assert!(matches_route("", "/"));
        assert!(matches_route("/rpc", "/rpc"));
        assert!(matches_route("/RPC/", "/rpc"));
        assert!(matches_route("/rpc", "/rpc/"));
        assert!(!matches_route("/rpc/x", "/rpc"));
        assert!(!matches_route("/other", "/"));
    }
}
