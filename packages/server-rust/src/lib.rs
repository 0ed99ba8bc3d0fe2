//! dynrpc server: runtime-resolved JSON RPC dispatch over HTTP with compact
//! token authentication.

pub mod network;
pub mod service;
pub mod token;

pub use network::{NetworkConfig, NetworkModule};
pub use service::{DispatchConfig, Dispatcher, ServerOptions, ServiceLocator};
pub use token::{TokenConfig, TokenService};
