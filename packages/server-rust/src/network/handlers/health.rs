//! Health, liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Detailed health JSON. Always 200; `state` carries the actual health.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let registry = state.dispatcher.registry();
    Json(json!({
        "state": state.lifecycle.state().as_str(),
        "route_prefix": registry.route_prefix(),
        "interfaces": registry.interface_count(),
        "types": registry.type_count(),
        "in_flight": state.lifecycle.active_calls(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 once serving, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.lifecycle.state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::network::ServerLifecycle;
    use crate::service::{DispatchConfig, Dispatcher, ServerOptions, ServiceLocator, TypeDescriptor};

    fn test_state() -> AppState {
        let mut options = ServerOptions::new();
        options
            .add_type(TypeDescriptor::named("demo.A").implements("demo.IA"))
            .add_type(TypeDescriptor::named("demo.B").implements("demo.IA"))
            .register_interface("demo.IA")
            .set_route_prefix("/rpc");
        AppState {
            dispatcher: Arc::new(Dispatcher::new(
                options.build(),
                Arc::new(ServiceLocator::new()),
                DispatchConfig::default(),
            )),
            lifecycle: Arc::new(ServerLifecycle::new()),
            start_time: Instant::now(),
            max_body_bytes: 1024,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn health_reports_registry_and_state() {
        let state = test_state();
        state.lifecycle.mark_ready();
        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["route_prefix"], "/rpc");
        assert_eq!(json["interfaces"], 1);
        assert_eq!(json["types"], 2);
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_in_flight_calls() {
        let state = test_state();
        let _guard = state.lifecycle.track_call();
        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "starting");
        assert_eq!(json["in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_lifecycle() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        state.lifecycle.mark_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);
        state.lifecycle.begin_drain();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
