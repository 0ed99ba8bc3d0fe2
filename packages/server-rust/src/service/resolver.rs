//! Maps a request's interface, target and action onto a registered type and
//! method.
//!
//! Every lookup ranks its candidates and keeps only the best non-empty rank.
//! Exact matches therefore always win, and ambiguity is reported only when
//! several candidates tie at the best rank.

use std::sync::Arc;

use super::descriptor::{short_name, MethodDescriptor, TypeDescriptor};
use super::errors::DispatchError;
use super::registry::Registry;
use super::request::RpcRequest;

/// Outcome of resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub target: Arc<TypeDescriptor>,
    pub method: Arc<MethodDescriptor>,
}

/// Resolves the request's target type and method.
///
/// # Errors
///
/// Returns the matching [`DispatchError`] resolution variant when the
/// interface, target or method cannot be identified, or when the target does
/// not declare exactly one constructor.
pub fn resolve(registry: &Registry, request: &RpcRequest) -> Result<Resolved, DispatchError> {
    let target = resolve_target(registry, request.interface.as_deref(), &request.target)?;
    let method = resolve_method(&target, &request.action)?;
    Ok(Resolved { target, method })
}

fn resolve_target(
    registry: &Registry,
    interface: Option<&str>,
    target: &str,
) -> Result<Arc<TypeDescriptor>, DispatchError> {
    let interface = match interface {
        Some(name) => name,
        None => match find_in_type_index(registry, target) {
            Ok(Some(found)) => return Ok(found),
            Ok(None) => registry.default_interface().ok_or(DispatchError::NoInterface)?,
            // A short name shared across namespaces may still be unique under
            // the default interface.
            Err(ambiguous) => registry.default_interface().ok_or(ambiguous)?,
        },
    };

    let (interface_name, implementors) = match_interface(registry, interface)?;
    select_implementor(interface_name, implementors, target)
}

/// Flat lookup across every indexed type: full name, then unique short name.
fn find_in_type_index(
    registry: &Registry,
    target: &str,
) -> Result<Option<Arc<TypeDescriptor>>, DispatchError> {
    let best = best_ranked(registry.types().map(|t| (t.name(), t)), |name| {
        if name.eq_ignore_ascii_case(target) {
            Some(0)
        } else if short_name(name).eq_ignore_ascii_case(target) {
            Some(1)
        } else {
            None
        }
    });
    match best.as_slice() {
        [] => Ok(None),
        [(_, only)] => Ok(Some(Arc::clone(only))),
        many => Err(DispatchError::AmbiguousTarget {
            target: target.to_string(),
            candidates: names(many),
        }),
    }
}

fn match_interface<'r>(
    registry: &'r Registry,
    requested: &str,
) -> Result<(&'r str, &'r [Arc<TypeDescriptor>]), DispatchError> {
    let lowered = requested.to_ascii_lowercase();
    let best = best_ranked(registry.interfaces(), |name| {
        let candidate = name.to_ascii_lowercase();
        if candidate == lowered {
            Some(0)
        } else if short_name(&candidate) == lowered {
            Some(1)
        } else if candidate.ends_with(&lowered) {
            Some(2)
        } else {
            None
        }
    });
    match best.as_slice() {
        [] => Err(DispatchError::InterfaceNotRegistered {
            name: requested.to_string(),
        }),
        [(name, types)] => Ok((*name, *types)),
        many => Err(DispatchError::AmbiguousInterface {
            name: requested.to_string(),
            candidates: names(many),
        }),
    }
}

fn select_implementor(
    interface: &str,
    implementors: &[Arc<TypeDescriptor>],
    target: &str,
) -> Result<Arc<TypeDescriptor>, DispatchError> {
    let best = best_ranked(implementors.iter().map(|t| (t.name(), t)), |name| {
        if name == target {
            Some(0)
        } else if name.eq_ignore_ascii_case(target) {
            Some(1)
        } else if short_name(name).eq_ignore_ascii_case(target) {
            Some(2)
        } else {
            None
        }
    });
    match best.as_slice() {
        [] => Err(DispatchError::TargetNotFound {
            target: target.to_string(),
            interface: Some(interface.to_string()),
        }),
        [(_, only)] => Ok(Arc::clone(only)),
        many => Err(DispatchError::AmbiguousTarget {
            target: target.to_string(),
            candidates: names(many),
        }),
    }
}

fn resolve_method(
    target: &TypeDescriptor,
    action: &str,
) -> Result<Arc<MethodDescriptor>, DispatchError> {
    if target.constructor_count() != 1 {
        return Err(DispatchError::ConstructorCount {
            type_name: target.name().to_string(),
            count: target.constructor_count(),
        });
    }

    let best = best_ranked(target.methods().iter().map(|m| (m.name(), m)), |name| {
        if name == action {
            Some(0)
        } else if name.eq_ignore_ascii_case(action) {
            Some(1)
        } else {
            None
        }
    });
    match best.as_slice() {
        [] => Err(DispatchError::MethodNotFound {
            method: action.to_string(),
            type_name: target.name().to_string(),
        }),
        [(_, only)] => Ok(Arc::clone(only)),
        many => Err(DispatchError::AmbiguousMethod {
            method: action.to_string(),
            type_name: target.name().to_string(),
            candidates: names(many),
        }),
    }
}

/// Keeps the candidates sharing the lowest rank. `rank` returns `None` for
/// non-matches.
fn best_ranked<'a, T>(
    candidates: impl Iterator<Item = (&'a str, T)>,
    rank: impl Fn(&str) -> Option<u8>,
) -> Vec<(&'a str, T)> {
    let mut best_rank = None;
    let mut best = Vec::new();
    for (name, item) in candidates {
        let Some(r) = rank(name) else { continue };
        match best_rank {
            Some(current) if r > current => {}
            Some(current) if r == current => best.push((name, item)),
            _ => {
                best_rank = Some(r);
                best.clear();
                best.push((name, item));
            }
        }
    }
    best
}

fn names<T>(candidates: &[(&str, T)]) -> Vec<String> {
    let mut names: Vec<String> = candidates.iter().map(|(n, _)| (*n).to_string()).collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
