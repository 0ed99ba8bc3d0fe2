//! Envelope validation: turns a raw HTTP method and body into an [`RpcRequest`].

use axum::http::Method;
use dynrpc_core::convert::json_kind;
use dynrpc_core::RequestEnvelope;
use serde_json::{Map, Value};

use super::errors::DispatchError;

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// Call arguments as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Arguments matched to parameters by position.
    Positional(Vec<Value>),
    /// Arguments matched to parameters by name.
    Named(Map<String, Value>),
    /// Anything other than an array, object or null. Rejected at bind time.
    Unsupported(Value),
}

impl Params {
    /// JSON text of the arguments, used as part of response cache keys.
    #[must_use]
    pub fn canonical(&self) -> String {
        let value = match self {
            Self::Positional(items) => Value::Array(items.clone()),
            Self::Named(map) => Value::Object(map.clone()),
            Self::Unsupported(value) => value.clone(),
        };
        value.to_string()
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Positional(_) => "array",
            Self::Named(_) => "object",
            Self::Unsupported(value) => json_kind(value),
        }
    }
}

impl From<Value> for Params {
    /// Absent or `null` params read as an empty positional list.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Positional(Vec::new()),
            Value::Array(items) => Self::Positional(items),
            Value::Object(map) => Self::Named(map),
            other => Self::Unsupported(other),
        }
    }
}

// ---------------------------------------------------------------------------
// RpcRequest
// ---------------------------------------------------------------------------

/// A validated call request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub interface: Option<String>,
    pub target: String,
    /// Method name with `.` already normalized to `_`.
    pub action: String,
    pub params: Params,
    pub token: Option<String>,
    pub introspect: bool,
}

impl TryFrom<RequestEnvelope> for RpcRequest {
    type Error = DispatchError;

    fn try_from(envelope: RequestEnvelope) -> Result<Self, Self::Error> {
        let target = non_blank(envelope.target).ok_or(DispatchError::MissingTarget)?;
        let action = non_blank(envelope.action)
            .ok_or(DispatchError::MissingAction)?
            .replace('.', "_");
        Ok(Self {
            interface: non_blank(envelope.interface),
            target,
            action,
            params: Params::from(envelope.params),
            token: non_blank(envelope.token),
            introspect: envelope.introspect,
        })
    }
}

/// Validates the HTTP method and parses the body into an [`RpcRequest`].
///
/// # Errors
///
/// Returns [`DispatchError::MethodNotAllowed`] for non-POST methods,
/// [`DispatchError::Format`] for empty or unparseable bodies, and
/// [`DispatchError::MissingTarget`] / [`DispatchError::MissingAction`] when
/// either field is absent or blank.
pub fn validate_request(method: &Method, body: &[u8]) -> Result<RpcRequest, DispatchError> {
    if method != Method::POST {
        return Err(DispatchError::MethodNotAllowed);
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DispatchError::Format {
            detail: "body is empty".to_string(),
        });
    }
    let envelope: RequestEnvelope =
        serde_json::from_slice(body).map_err(|err| DispatchError::Format {
            detail: err.to_string(),
        })?;
    RpcRequest::try_from(envelope)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
