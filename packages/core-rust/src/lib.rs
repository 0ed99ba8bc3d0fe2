//! `dynrpc` Core: request/response envelopes, declarative type shapes, and
//! JSON value conversion shared by the dispatcher and its callers.

pub mod convert;
pub mod envelope;
pub mod schema;

pub use convert::{apply_defaults, bind_structured, convert_scalar, ShapeError};
pub use envelope::{RequestEnvelope, ResponseEnvelope, CODE_FAILURE, CODE_INFO, CODE_SUCCESS};
pub use schema::{describe_member, EnumShape, FieldDef, ObjectShape, ScalarKind, TypeShape};
