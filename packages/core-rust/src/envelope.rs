//! Wire envelopes for the JSON-over-HTTP RPC transport.
//!
//! A caller POSTs a [`RequestEnvelope`] and always receives a
//! [`ResponseEnvelope`]. Failures are signalled through `code`/`message`,
//! never through the HTTP status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure sentinel. Also the value of a response nobody has written yet.
pub const CODE_FAILURE: i32 = -1;

/// Informational success (introspection payloads).
pub const CODE_INFO: i32 = 0;

/// Successful invocation of the target method.
pub const CODE_SUCCESS: i32 = 1;

// ---------------------------------------------------------------------------
// RequestEnvelope
// ---------------------------------------------------------------------------

/// Inbound request body as posted by the caller.
///
/// Every field is optional at the serde level so that a structurally valid
/// JSON object always parses; presence checks happen during validation where
/// they can produce a specific message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Interface name, full (`acme.billing.Invoices`) or short (`Invoices`).
    #[serde(default, alias = "Interface", skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Implementation type name, full or short.
    #[serde(default, alias = "Target")]
    pub target: Option<String>,
    /// Method name. Dots are accepted as shorthand for underscores.
    #[serde(default, alias = "Action")]
    pub action: Option<String>,
    /// Positional (array) or named (object) arguments.
    #[serde(default, alias = "Params")]
    pub params: Value,
    /// Compact token presented by the caller.
    #[serde(default, alias = "Token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// When set, the dispatcher describes the method instead of calling it.
    #[serde(default, rename = "getStructInfoData", alias = "GetStructInfoData")]
    pub introspect: bool,
}

// ---------------------------------------------------------------------------
// ResponseEnvelope
// ---------------------------------------------------------------------------

/// Uniform response body written for every recognized RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Outcome code; see [`CODE_FAILURE`], [`CODE_INFO`], [`CODE_SUCCESS`].
    pub code: i32,
    /// Human-readable outcome.
    pub message: String,
    /// Method result, introspection descriptor, or `null`.
    pub data: Value,
    /// Wall-clock time spent dispatching, in milliseconds.
    #[serde(rename = "time")]
    pub elapsed_millis: f64,
}

impl ResponseEnvelope {
    /// A failure carrying only a message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::failure_with_data(message, Value::Null)
    }

    /// A failure with an attached payload (e.g. an introspection descriptor).
    #[must_use]
    pub fn failure_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            code: CODE_FAILURE,
            message: message.into(),
            data,
            elapsed_millis: 0.0,
        }
    }

    /// An informational response (`code = 0`).
    #[must_use]
    pub fn info(message: impl Into<String>, data: Value) -> Self {
        Self {
            code: CODE_INFO,
            message: message.into(),
            data,
            elapsed_millis: 0.0,
        }
    }

    /// A successful invocation result.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            code: CODE_SUCCESS,
            message: "ok".to_string(),
            data,
            elapsed_millis: 0.0,
        }
    }

    /// Returns `true` when the code is the failure sentinel.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.code == CODE_FAILURE
    }
}

impl Default for ResponseEnvelope {
    /// An unset response: failure sentinel with an empty message.
    fn default() -> Self {
        Self::failure(String::new())
    }
}
