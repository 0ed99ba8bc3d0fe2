//! Request-stage errors. Each renders as the `message` of a failure envelope.

use dynrpc_core::ShapeError;

/// Errors raised before a handler runs: envelope validation, resolution,
/// argument binding and filter construction.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("only POST requests are accepted")]
    MethodNotAllowed,
    #[error("request body is not a valid rpc envelope: {detail}")]
    Format { detail: String },
    #[error("missing target")]
    MissingTarget,
    #[error("missing action")]
    MissingAction,
    #[error("no interface specified and no default interface is set")]
    NoInterface,
    #[error("interface `{name}` is not registered")]
    InterfaceNotRegistered { name: String },
    #[error("interface `{name}` is ambiguous; candidates: {}", .candidates.join(", "))]
    AmbiguousInterface {
        name: String,
        candidates: Vec<String>,
    },
    #[error("target `{target}` was not found{}", in_interface(.interface.as_deref()))]
    TargetNotFound {
        target: String,
        interface: Option<String>,
    },
    #[error("target `{target}` is ambiguous; candidates: {}", .candidates.join(", "))]
    AmbiguousTarget {
        target: String,
        candidates: Vec<String>,
    },
    #[error("type `{type_name}` declares {count} constructors; exactly one is required")]
    ConstructorCount { type_name: String, count: usize },
    #[error("method `{method}` was not found on type `{type_name}`")]
    MethodNotFound { method: String, type_name: String },
    #[error("method `{method}` is ambiguous on type `{type_name}`; candidates: {}", .candidates.join(", "))]
    AmbiguousMethod {
        method: String,
        type_name: String,
        candidates: Vec<String>,
    },
    #[error("parameter `{param}` could not be converted to {expected}: {source}")]
    ParamConversion {
        param: String,
        expected: String,
        #[source]
        source: ShapeError,
    },
    #[error("method `{method}` requires {required} argument(s) but {supplied} were supplied")]
    InsufficientArguments {
        method: String,
        required: usize,
        supplied: usize,
    },
    #[error("params must be a JSON array or object, got {kind}")]
    UnsupportedParams { kind: &'static str },
    #[error("filter `{name}` could not be created: {message}")]
    FilterCreation { name: String, message: String },
}

impl DispatchError {
    /// Binding errors carry the method descriptor in the failure envelope.
    #[must_use]
    pub fn is_binding(&self) -> bool {
        matches!(
            self,
            Self::ParamConversion { .. }
                | Self::InsufficientArguments { .. }
                | Self::UnsupportedParams { .. }
        )
    }
}

fn in_interface(interface: Option<&str>) -> String {
    interface.map_or_else(String::new, |name| format!(" under interface `{name}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguity_lists_candidates() {
        let err = DispatchError::AmbiguousTarget {
            target: "Svc".into(),
            candidates: vec!["a.Svc".into(), "b.Svc".into()],
        };
        assert_eq!(
            err.to_string(),
            "target `Svc` is ambiguous; candidates: a.Svc, b.Svc"
        );
    }

    #[test]
    fn target_not_found_names_interface_when_known() {
        let scoped = DispatchError::TargetNotFound {
            target: "Nope".into(),
            interface: Some("acme.IGreeter".into()),
        };
        assert!(scoped.to_string().ends_with("under interface `acme.IGreeter`"));

        let flat = DispatchError::TargetNotFound {
            target: "Nope".into(),
            interface: None,
        };
        assert_eq!(flat.to_string(), "target `Nope` was not found");
    }

    #[test]
    fn only_binding_errors_are_flagged() {
        assert!(DispatchError::UnsupportedParams { kind: "string" }.is_binding());
        assert!(!DispatchError::MissingAction.is_binding());
    }
}
