//! Conversion of caller-supplied JSON values into declared shapes.
//!
//! Two strategies exist:
//!
//! - [`convert_scalar`] is lenient and returns `None` on failure; callers fall
//!   back to a default or zero value.
//! - [`bind_structured`] is strict and returns a [`ShapeError`] describing the
//!   first mismatch, so the caller can be told what went wrong.
//!
//! [`apply_defaults`] enforces server-controlled field defaults after binding.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::schema::{EnumShape, ObjectShape, ScalarKind, TypeShape};

// ---------------------------------------------------------------------------
// ShapeError
// ---------------------------------------------------------------------------

/// Structural mismatch between a JSON value and a declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("expected {expected}, got {found}")]
    Mismatch {
        expected: String,
        found: &'static str,
    },
    #[error("missing required field `{field}`")]
    MissingField { field: String },
    #[error("field `{field}`: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<ShapeError>,
    },
    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<ShapeError>,
    },
    #[error("key `{key}` is not a valid {expected}")]
    Key { key: String, expected: String },
}

impl ShapeError {
    fn mismatch(shape: &TypeShape, found: &Value) -> Self {
        Self::Mismatch {
            expected: shape.display_name(),
            found: json_kind(found),
        }
    }
}

/// Name of a JSON value's kind, for messages.
#[must_use]
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Scalar conversion
// ---------------------------------------------------------------------------

/// Converts a JSON value to a scalar-like shape, or `None` if it cannot.
///
/// Structured shapes are delegated to [`bind_structured`] with the error
/// discarded, so this never panics on any input.
#[must_use]
pub fn convert_scalar(value: &Value, shape: &TypeShape) -> Option<Value> {
    match shape {
        TypeShape::Scalar(kind) => convert_primitive(value, *kind),
        TypeShape::Enum(e) => convert_enum(value, e),
        TypeShape::Nullable(inner) => {
            if value.is_null() {
                Some(Value::Null)
            } else {
                convert_scalar(value, inner)
            }
        }
        TypeShape::Any => Some(value.clone()),
        TypeShape::Unit => Some(Value::Null),
        TypeShape::Object(_) | TypeShape::Array(_) | TypeShape::Map(..) => {
            bind_structured(value, shape).ok()
        }
    }
}

fn convert_primitive(value: &Value, kind: ScalarKind) -> Option<Value> {
    match kind {
        ScalarKind::Int => to_i64(value).map(Value::from),
        ScalarKind::UInt => to_i64(value)
            .and_then(|n| u64::try_from(n).ok())
            .or_else(|| value.as_u64())
            .map(Value::from),
        ScalarKind::Float => to_f64(value)
            .and_then(Number::from_f64)
            .map(Value::Number),
        ScalarKind::Bool => to_bool(value).map(Value::Bool),
        ScalarKind::String => match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
    }
}

// Integral floats below 2^53 convert exactly.
#[allow(clippy::cast_possible_truncation)]
fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|f: &f64| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn convert_enum(value: &Value, shape: &EnumShape) -> Option<Value> {
    match value {
        Value::String(s) => shape
            .variants
            .iter()
            .find(|v| v.as_str() == s)
            .or_else(|| shape.variants.iter().find(|v| v.eq_ignore_ascii_case(s)))
            .map(|v| Value::String(v.clone())),
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| shape.variants.get(i))
            .map(|v| Value::String(v.clone())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Structural binding
// ---------------------------------------------------------------------------

/// Binds a JSON value to a shape, normalizing it on the way.
///
/// Object fields are matched case-insensitively and re-keyed to their
/// declared names; undeclared keys are carried over unchanged. `null` is
/// accepted for objects and nullable shapes.
///
/// # Errors
///
/// Returns the first [`ShapeError`] found, wrapped with the field or element
/// path that led to it.
pub fn bind_structured(value: &Value, shape: &TypeShape) -> Result<Value, ShapeError> {
    match shape {
        TypeShape::Nullable(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                bind_structured(value, inner)
            }
        }
        TypeShape::Object(obj) => match value {
            Value::Null => Ok(Value::Null),
            Value::Object(map) => bind_object(map, obj),
            other => Err(ShapeError::mismatch(shape, other)),
        },
        TypeShape::Array(element) => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    bind_structured(item, element).map_err(|source| ShapeError::Element {
                        index,
                        source: Box::new(source),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(ShapeError::mismatch(shape, other)),
        },
        TypeShape::Map(key, val) => match value {
            Value::Object(map) => bind_map(map, key, val),
            other => Err(ShapeError::mismatch(shape, other)),
        },
        scalar => convert_scalar(value, scalar).ok_or_else(|| ShapeError::mismatch(scalar, value)),
    }
}

fn bind_object(input: &Map<String, Value>, shape: &ObjectShape) -> Result<Value, ShapeError> {
    let mut out = Map::new();
    let mut consumed: Vec<&str> = Vec::with_capacity(shape.fields.len());

    for field in &shape.fields {
        match lookup_key(input, &field.name) {
            Some((key, raw)) => {
                consumed.push(key);
                let bound =
                    bind_structured(raw, &field.shape).map_err(|source| ShapeError::Field {
                        field: field.name.clone(),
                        source: Box::new(source),
                    })?;
                out.insert(field.name.clone(), bound);
            }
            None if field.required => {
                return Err(ShapeError::MissingField {
                    field: field.name.clone(),
                });
            }
            None => {}
        }
    }

    for (key, raw) in input {
        if !consumed.contains(&key.as_str()) && !out.contains_key(key) {
            out.insert(key.clone(), raw.clone());
        }
    }

    Ok(Value::Object(out))
}

fn bind_map(
    input: &Map<String, Value>,
    key_shape: &TypeShape,
    value_shape: &TypeShape,
) -> Result<Value, ShapeError> {
    let mut out = Map::new();
    for (key, raw) in input {
        let key_value = Value::String(key.clone());
        if convert_scalar(&key_value, key_shape).is_none() {
            return Err(ShapeError::Key {
                key: key.clone(),
                expected: key_shape.display_name(),
            });
        }
        let bound = bind_structured(raw, value_shape).map_err(|source| ShapeError::Field {
            field: key.clone(),
            source: Box::new(source),
        })?;
        out.insert(key.clone(), bound);
    }
    Ok(Value::Object(out))
}

/// Finds `name` in a JSON object: exact key first, then case-insensitive.
#[must_use]
pub fn lookup_key<'a>(map: &'a Map<String, Value>, name: &str) -> Option<(&'a str, &'a Value)> {
    map.get_key_value(name)
        .or_else(|| map.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)))
        .map(|(k, v)| (k.as_str(), v))
}

// ---------------------------------------------------------------------------
// Default fixups
// ---------------------------------------------------------------------------

/// Forces every declared field default onto a bound value.
///
/// Walks objects, arrays and maps recursively. A `null` object is left alone:
/// there is no record to fix up.
pub fn apply_defaults(shape: &TypeShape, value: &mut Value) {
    match (shape.unwrap_nullable(), value) {
        (TypeShape::Object(obj), Value::Object(map)) => {
            for field in &obj.fields {
                if let Some(default) = &field.default_value {
                    map.insert(field.name.clone(), default.clone());
                } else if let Some(nested) = map.get_mut(&field.name) {
                    apply_defaults(&field.shape, nested);
                }
            }
        }
        (TypeShape::Array(element), Value::Array(items)) => {
            for item in items {
                apply_defaults(element, item);
            }
        }
        (TypeShape::Map(_, val), Value::Object(map)) => {
            for item in map.values_mut() {
                apply_defaults(val, item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::schema::FieldDef;

    fn line_shape() -> TypeShape {
        ObjectShape::new("Line")
            .field(FieldDef::new("sku", TypeShape::string()).required())
            .field(FieldDef::new("qty", TypeShape::int()))
            .into_shape()
    }

    fn order_shape() -> TypeShape {
        ObjectShape::new("Order")
            .field(FieldDef::new("id", TypeShape::int()).required())
            .field(FieldDef::new("lines", TypeShape::array(line_shape())))
            .field(FieldDef::new("owner", TypeShape::string()).default_value("server"))
            .into_shape()
    }

    #[test]
    fn int_accepts_numeric_strings_and_integral_floats() {
        assert_eq!(convert_scalar(&json!("42"), &TypeShape::int()), Some(json!(42)));
        assert_eq!(convert_scalar(&json!(7.0), &TypeShape::int()), Some(json!(7)));
        assert_eq!(convert_scalar(&json!(true), &TypeShape::int()), Some(json!(1)));
        assert_eq!(convert_scalar(&json!(7.5), &TypeShape::int()), None);
        assert_eq!(convert_scalar(&json!("abc"), &TypeShape::int()), None);
    }

    #[test]
    fn uint_rejects_negative() {
        assert_eq!(convert_scalar(&json!(-1), &TypeShape::uint()), None);
        assert_eq!(convert_scalar(&json!("5"), &TypeShape::uint()), Some(json!(5)));
    }

    #[test]
    fn bool_accepts_strings_any_case() {
        assert_eq!(convert_scalar(&json!("TRUE"), &TypeShape::bool()), Some(json!(true)));
        assert_eq!(convert_scalar(&json!(0), &TypeShape::bool()), Some(json!(false)));
        assert_eq!(convert_scalar(&json!("yes"), &TypeShape::bool()), None);
    }

    #[test]
    fn string_stringifies_primitives_only() {
        assert_eq!(convert_scalar(&json!(12), &TypeShape::string()), Some(json!("12")));
        assert_eq!(convert_scalar(&json!(null), &TypeShape::string()), None);
        assert_eq!(convert_scalar(&json!([1]), &TypeShape::string()), None);
    }

    #[test]
    fn enum_matches_name_or_ordinal() {
        let color = TypeShape::enumeration("Color", ["Red", "Green"]);
        assert_eq!(convert_scalar(&json!("green"), &color), Some(json!("Green")));
        assert_eq!(convert_scalar(&json!(0), &color), Some(json!("Red")));
        assert_eq!(convert_scalar(&json!(5), &color), None);
    }

    #[test]
    fn nullable_accepts_null() {
        let shape = TypeShape::nullable(TypeShape::int());
        assert_eq!(convert_scalar(&Value::Null, &shape), Some(Value::Null));
        assert_eq!(convert_scalar(&json!("3"), &shape), Some(json!(3)));
    }

    #[test]
    fn object_binding_rekeys_case_insensitively() {
        let bound = bind_structured(
            &json!({"ID": "12", "Lines": [{"SKU": "a", "qty": 2}], "extra": true}),
            &order_shape(),
        )
        .unwrap();
        assert_eq!(bound["id"], 12);
        assert_eq!(bound["lines"][0]["sku"], "a");
        assert_eq!(bound["extra"], true);
        assert!(bound.get("ID").is_none());
    }

    #[test]
    fn object_binding_reports_path_of_failure() {
        let err = bind_structured(
            &json!({"id": 1, "lines": [{"sku": "a"}, {"qty": 1}]}),
            &order_shape(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "field `lines`: element 1: missing required field `sku`"
        );
    }

    #[test]
    fn object_binding_rejects_wrong_kind() {
        let err = bind_structured(&json!("nope"), &order_shape()).unwrap_err();
        assert_eq!(err.to_string(), "expected Order, got string");
    }

    #[test]
    fn map_binding_checks_key_shape() {
        let shape = TypeShape::map(TypeShape::int(), TypeShape::string());
        assert!(bind_structured(&json!({"1": "a"}), &shape).is_ok());
        let err = bind_structured(&json!({"x": "a"}), &shape).unwrap_err();
        assert!(matches!(err, ShapeError::Key { .. }));
    }

    #[test]
    fn defaults_override_caller_values() {
        let mut value = json!({"id": 1, "owner": "mallory"});
        apply_defaults(&order_shape(), &mut value);
        assert_eq!(value["owner"], "server");
    }

    #[test]
    fn defaults_apply_through_arrays() {
        let shape = TypeShape::array(order_shape());
        let mut value = json!([{"id": 1}, {"id": 2, "owner": "x"}]);
        apply_defaults(&shape, &mut value);
        assert_eq!(value[0]["owner"], "server");
        assert_eq!(value[1]["owner"], "server");
    }

    #[test]
    fn defaults_skip_null_objects() {
        let mut value = Value::Null;
        apply_defaults(&order_shape(), &mut value);
        assert!(value.is_null());
    }

    #[test]
    fn lookup_prefers_exact_key() {
        let map = json!({"name": 1, "NAME": 2});
        let (key, value) = lookup_key(map.as_object().unwrap(), "NAME").unwrap();
        assert_eq!(key, "NAME");
        assert_eq!(*value, json!(2));
    }

    proptest! {
        #[test]
        fn int_strings_round_trip(n in any::<i64>()) {
            prop_assert_eq!(
                convert_scalar(&json!(n.to_string()), &TypeShape::int()),
                Some(json!(n))
            );
        }

        #[test]
        fn scalar_conversion_never_panics(s in ".*") {
            let _ = convert_scalar(&json!(s), &TypeShape::int());
            let _ = convert_scalar(&json!(s), &TypeShape::float());
            let _ = convert_scalar(&json!(s), &TypeShape::bool());
        }
    }
}
