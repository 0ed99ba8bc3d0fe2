//! HTTP host surface: configuration, middleware, handlers and the server
//! lifecycle.

pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod module;

pub use config::NetworkConfig;
pub use handlers::{rpc_handler, rpc_middleware, AppState};
pub use lifecycle::{CallGuard, HealthState, ServerLifecycle};
pub use module::NetworkModule;
