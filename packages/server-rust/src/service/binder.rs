//! Binds request params to a method's declared parameters.

use dynrpc_core::convert::lookup_key;
use dynrpc_core::{apply_defaults, bind_structured, convert_scalar, TypeShape};
use serde_json::{Map, Value};

use super::descriptor::{MethodDescriptor, ParamDef};
use super::errors::DispatchError;
use super::request::Params;

/// Produces one argument per declared parameter, in declaration order.
///
/// # Errors
///
/// Returns a binding [`DispatchError`] when a structured argument does not fit
/// its shape, when fewer positional arguments than required parameters are
/// supplied, or when params are neither an array nor an object.
pub fn bind(method: &MethodDescriptor, params: &Params) -> Result<Vec<Value>, DispatchError> {
    let mut args = match params {
        Params::Positional(values) => bind_positional(method, values)?,
        Params::Named(map) => bind_named(method, map)?,
        Params::Unsupported(_) => {
            return Err(DispatchError::UnsupportedParams {
                kind: params.kind(),
            })
        }
    };
    for (param, arg) in method.params().iter().zip(args.iter_mut()) {
        apply_defaults(&param.shape, arg);
    }
    Ok(args)
}

fn bind_positional(method: &MethodDescriptor, values: &[Value]) -> Result<Vec<Value>, DispatchError> {
    let required = method.params().iter().filter(|p| p.is_required()).count();
    if values.len() < required {
        return Err(DispatchError::InsufficientArguments {
            method: method.name().to_string(),
            required,
            supplied: values.len(),
        });
    }
    method
        .params()
        .iter()
        .enumerate()
        .map(|(i, param)| match values.get(i) {
            Some(value) => bind_one(param, value),
            None => Ok(param.fallback_value()),
        })
        .collect()
}

fn bind_named(
    method: &MethodDescriptor,
    map: &Map<String, Value>,
) -> Result<Vec<Value>, DispatchError> {
    let mut mapped = 0;
    let mut args = Vec::with_capacity(method.params().len());
    for param in method.params() {
        match lookup_key(map, &param.name) {
            Some((_, value)) => {
                mapped += 1;
                args.push(bind_one(param, value)?);
            }
            None => args.push(param.fallback_value()),
        }
    }

    if mapped == 0 && !map.is_empty() {
        // A flat object posted for a single DTO parameter.
        let mut receivers = method
            .params()
            .iter()
            .enumerate()
            .filter(|(_, p)| accepts_object(&p.shape));
        if let (Some((index, param)), None) = (receivers.next(), receivers.next()) {
            args[index] = bind_structured_param(param, &Value::Object(map.clone()))?;
        }
    }
    Ok(args)
}

fn bind_one(param: &ParamDef, value: &Value) -> Result<Value, DispatchError> {
    if param.shape.is_structured() {
        bind_structured_param(param, value)
    } else {
        Ok(convert_scalar(value, &param.shape).unwrap_or_else(|| param.fallback_value()))
    }
}

fn bind_structured_param(param: &ParamDef, value: &Value) -> Result<Value, DispatchError> {
    bind_structured(value, &param.shape).map_err(|source| DispatchError::ParamConversion {
        param: param.name.clone(),
        expected: param.shape.display_name(),
        source,
    })
}

fn accepts_object(shape: &TypeShape) -> bool {
    matches!(
        shape.unwrap_nullable(),
        TypeShape::Object(_) | TypeShape::Map(..)
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
