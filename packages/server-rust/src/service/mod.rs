//! RPC dispatch framework.
//!
//! A call flows through these stages:
//!
//! 1. **Validation** (`request`): HTTP method + body -> `RpcRequest`
//! 2. **Resolution** (`resolver`): interface, target type and method lookup
//! 3. **Binding** (`binder`): params -> ordered arguments, or an
//!    introspection descriptor (`introspect`) instead
//! 4. **Middleware** (`middleware`): metrics and per-method filters as Tower layers
//! 5. **Invocation** (`invoker`): construct the target and run the handler
//!
//! Types are made callable through explicit descriptors (`descriptor`)
//! registered at startup (`registry`).

pub mod binder;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod errors;
pub mod introspect;
pub mod invoker;
pub mod middleware;
pub mod registry;
pub mod request;
pub mod resolver;

// Re-export key types for convenient access.
pub use config::DispatchConfig;
pub use context::DispatchContext;
pub use descriptor::{
    qualified_name, Args, MethodDescriptor, MethodHandler, ParamDef, TypeDescriptor,
};
pub use dispatcher::Dispatcher;
pub use errors::DispatchError;
pub use middleware::{FilterDescriptor, Next, RpcFilter, TokenAuthFilter};
pub use registry::{Registry, RegistryError, ServerOptions, ServiceLocator};
pub use request::{Params, RpcRequest};
