//! Declarative type shapes for RPC parameters, fields and return values.
//!
//! Shapes stand in for runtime reflection: every registered method declares
//! the shape of its parameters and result, and object shapes carry their field
//! annotations (`required`, `ignored`, default value, description) as plain
//! data. The same shapes drive parameter binding, default-value fixups and the
//! introspection descriptor returned to callers.

use serde_json::{Map, Value};

/// Marker appended to required member names in descriptors.
pub const REQUIRED_MARKER: char = '*';

/// Marker appended to nullable descriptors.
pub const NULLABLE_MARKER: char = '?';

// ---------------------------------------------------------------------------
// ScalarKind
// ---------------------------------------------------------------------------

/// Primitive value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    String,
}

impl ScalarKind {
    /// Primitive name used in descriptors and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::String => "string",
        }
    }
}

// ---------------------------------------------------------------------------
// TypeShape
// ---------------------------------------------------------------------------

/// Shape of a value crossing the RPC boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    /// A primitive.
    Scalar(ScalarKind),
    /// A closed set of string variants.
    Enum(EnumShape),
    /// `null` or the inner shape.
    Nullable(Box<TypeShape>),
    /// Homogeneous sequence.
    Array(Box<TypeShape>),
    /// String-keyed map; the key shape constrains what the key text parses as.
    Map(Box<TypeShape>, Box<TypeShape>),
    /// Structured record with annotated fields.
    Object(ObjectShape),
    /// Arbitrary JSON, passed through untouched.
    Any,
    /// No value (methods without a result).
    Unit,
}

impl TypeShape {
    #[must_use]
    pub fn bool() -> Self {
        Self::Scalar(ScalarKind::Bool)
    }

    #[must_use]
    pub fn int() -> Self {
        Self::Scalar(ScalarKind::Int)
    }

    #[must_use]
    pub fn uint() -> Self {
        Self::Scalar(ScalarKind::UInt)
    }

    #[must_use]
    pub fn float() -> Self {
        Self::Scalar(ScalarKind::Float)
    }

    #[must_use]
    pub fn string() -> Self {
        Self::Scalar(ScalarKind::String)
    }

    /// Enum shape with the given variant names, in declaration order.
    #[must_use]
    pub fn enumeration<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(EnumShape {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        })
    }

    #[must_use]
    pub fn nullable(inner: Self) -> Self {
        Self::Nullable(Box::new(inner))
    }

    #[must_use]
    pub fn array(element: Self) -> Self {
        Self::Array(Box::new(element))
    }

    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Strips any number of `Nullable` wrappers.
    #[must_use]
    pub fn unwrap_nullable(&self) -> &Self {
        match self {
            Self::Nullable(inner) => inner.unwrap_nullable(),
            other => other,
        }
    }

    /// Objects, arrays and maps are bound structurally; everything else is
    /// converted as a scalar.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(
            self.unwrap_nullable(),
            Self::Object(_) | Self::Array(_) | Self::Map(..)
        )
    }

    /// Returns the object shape behind any nullable wrappers.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectShape> {
        match self.unwrap_nullable() {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The value an unbound parameter of this shape receives when it has no
    /// declared default.
    #[must_use]
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Scalar(ScalarKind::Bool) => Value::Bool(false),
            Self::Scalar(ScalarKind::Int | ScalarKind::UInt) => Value::from(0),
            Self::Scalar(ScalarKind::Float) => Value::from(0.0),
            Self::Scalar(ScalarKind::String) => Value::String(String::new()),
            Self::Enum(e) => e
                .variants
                .first()
                .map_or(Value::Null, |v| Value::String(v.clone())),
            Self::Array(_) => Value::Array(Vec::new()),
            Self::Map(..) => Value::Object(Map::new()),
            Self::Nullable(_) | Self::Object(_) | Self::Any | Self::Unit => Value::Null,
        }
    }

    /// Short human-readable name, used in binding error messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Object(obj) => obj.name.clone(),
            Self::Enum(e) => e.name.clone(),
            Self::Nullable(inner) => format!("{}{NULLABLE_MARKER}", inner.display_name()),
            Self::Array(inner) => format!("array[{}]", inner.display_name()),
            Self::Map(k, v) => format!("dict[{},{}]", k.display_name(), v.display_name()),
            other => match other.describe() {
                Value::String(s) => s,
                _ => String::from("object"),
            },
        }
    }

    /// Renders the recursive introspection descriptor for this shape.
    ///
    /// Scalars and enums render as strings; objects render as a field map.
    /// Containers render as strings when their parts do, and as JSON
    /// structures otherwise.
    #[must_use]
    pub fn describe(&self) -> Value {
        match self {
            Self::Scalar(kind) => Value::String(kind.as_str().to_string()),
            Self::Enum(e) => Value::String(format!("enum[{}]", e.variants.join("|"))),
            Self::Any => Value::String("any".to_string()),
            Self::Unit => Value::String("void".to_string()),
            Self::Nullable(inner) => match inner.describe() {
                Value::String(s) => Value::String(format!("{s}{NULLABLE_MARKER}")),
                Value::Object(mut fields) => {
                    fields.insert(NULLABLE_MARKER.to_string(), Value::Bool(true));
                    Value::Object(fields)
                }
                other => other,
            },
            Self::Array(element) => match element.describe() {
                Value::String(s) => Value::String(format!("array[{s}]")),
                other => Value::Array(vec![other]),
            },
            Self::Map(key, value) => match (key.describe(), value.describe()) {
                (Value::String(k), Value::String(v)) => Value::String(format!("dict[{k},{v}]")),
                (key_desc, value_desc) => {
                    let key_text = match key_desc {
                        Value::String(k) => k,
                        other => other.to_string(),
                    };
                    let mut out = Map::new();
                    out.insert(format!("dict[{key_text}]"), value_desc);
                    Value::Object(out)
                }
            },
            Self::Object(obj) => obj.describe(),
        }
    }
}

// ---------------------------------------------------------------------------
// EnumShape
// ---------------------------------------------------------------------------

/// Named closed set of string variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumShape {
    pub name: String,
    pub variants: Vec<String>,
}

// ---------------------------------------------------------------------------
// ObjectShape / FieldDef
// ---------------------------------------------------------------------------

/// Structured record shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectShape {
    /// Type name shown in error messages.
    pub name: String,
    /// Declared fields in declaration order.
    pub fields: Vec<FieldDef>,
}

impl ObjectShape {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field declaration.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Wraps this record into a [`TypeShape`].
    #[must_use]
    pub fn into_shape(self) -> TypeShape {
        TypeShape::Object(self)
    }

    /// Field map descriptor; ignored fields are left out.
    #[must_use]
    pub fn describe(&self) -> Value {
        let mut out = Map::new();
        for field in self.fields.iter().filter(|f| !f.ignored) {
            let (name, desc) = describe_member(
                &field.name,
                &field.shape,
                field.required,
                field.default_value.as_ref(),
                field.description.as_deref(),
            );
            out.insert(name, desc);
        }
        Value::Object(out)
    }
}

/// A single annotated field of an [`ObjectShape`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Name of the field as it appears in JSON.
    pub name: String,
    /// Shape of the field value.
    pub shape: TypeShape,
    /// Whether the field must be present when an object is bound.
    pub required: bool,
    /// Excluded from descriptors.
    pub ignored: bool,
    /// Server-controlled value, applied over whatever the caller sent.
    pub default_value: Option<Value>,
    /// Free-form documentation for descriptors.
    pub description: Option<String>,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
            ignored: false,
            default_value: None,
            description: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Renders one named member (field or parameter) of a descriptor.
///
/// Returns the display key (with [`REQUIRED_MARKER`] appended when required)
/// and the member descriptor. Members carrying a default or description are
/// expanded into `{"type", "default", "description"}`.
#[must_use]
pub fn describe_member(
    name: &str,
    shape: &TypeShape,
    required: bool,
    default_value: Option<&Value>,
    description: Option<&str>,
) -> (String, Value) {
    let key = if required {
        format!("{name}{REQUIRED_MARKER}")
    } else {
        name.to_string()
    };

    let desc = shape.describe();
    if default_value.is_none() && description.is_none() {
        return (key, desc);
    }

    let mut expanded = Map::new();
    expanded.insert("type".to_string(), desc);
    if let Some(default) = default_value {
        expanded.insert("default".to_string(), default.clone());
    }
    if let Some(text) = description {
        expanded.insert("description".to_string(), Value::String(text.to_string()));
    }
    (key, Value::Object(expanded))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn order_shape() -> TypeShape {
        ObjectShape::new("Order")
            .field(FieldDef::new("id", TypeShape::uint()).required())
            .field(FieldDef::new("note", TypeShape::nullable(TypeShape::string())))
            .field(FieldDef::new("internal", TypeShape::string()).ignored())
            .field(
                FieldDef::new("status", TypeShape::enumeration("Status", ["New", "Paid"]))
                    .default_value("New")
                    .description("server-controlled"),
            )
            .into_shape()
    }

    #[test]
    fn scalars_render_primitive_names() {
        assert_eq!(TypeShape::int().describe(), json!("int"));
        assert_eq!(TypeShape::string().describe(), json!("string"));
        assert_eq!(TypeShape::Any.describe(), json!("any"));
        assert_eq!(TypeShape::Unit.describe(), json!("void"));
    }

    #[test]
    fn nullable_appends_marker() {
        assert_eq!(TypeShape::nullable(TypeShape::int()).describe(), json!("int?"));
    }

    #[test]
    fn containers_of_scalars_render_inline() {
        assert_eq!(
            TypeShape::array(TypeShape::float()).describe(),
            json!("array[float]")
        );
        assert_eq!(
            TypeShape::map(TypeShape::string(), TypeShape::array(TypeShape::int())).describe(),
            json!("dict[string,array[int]]")
        );
    }

    #[test]
    fn object_renders_annotated_field_map() {
        let desc = order_shape().describe();
        assert_eq!(
            desc,
            json!({
                "id*": "uint",
                "note": "string?",
                "status": {
                    "type": "enum[New|Paid]",
                    "default": "New",
                    "description": "server-controlled"
                }
            })
        );
    }

    #[test]
    fn containers_of_objects_render_structurally() {
        let list = TypeShape::array(order_shape()).describe();
        assert!(list.is_array());
        assert_eq!(list[0]["id*"], "uint");

        let dict = TypeShape::map(TypeShape::string(), order_shape()).describe();
        assert_eq!(dict["dict[string]"]["note"], "string?");
    }

    #[test]
    fn nullable_object_gets_marker_key() {
        let desc = TypeShape::nullable(order_shape()).describe();
        assert_eq!(desc["?"], true);
        assert_eq!(desc["id*"], "uint");
    }

    #[test]
    fn zero_values_per_shape() {
        assert_eq!(TypeShape::int().zero_value(), json!(0));
        assert_eq!(TypeShape::bool().zero_value(), json!(false));
        assert_eq!(TypeShape::string().zero_value(), json!(""));
        assert_eq!(
            TypeShape::enumeration("Color", ["Red", "Green"]).zero_value(),
            json!("Red")
        );
        assert_eq!(TypeShape::array(TypeShape::int()).zero_value(), json!([]));
        assert_eq!(order_shape().zero_value(), Value::Null);
    }

    #[test]
    fn structured_classification_sees_through_nullable() {
        assert!(TypeShape::nullable(order_shape()).is_structured());
        assert!(TypeShape::array(TypeShape::int()).is_structured());
        assert!(!TypeShape::nullable(TypeShape::int()).is_structured());
        assert!(!TypeShape::Any.is_structured());
    }

    #[test]
    fn display_names_for_messages() {
        assert_eq!(order_shape().display_name(), "Order");
        assert_eq!(
            TypeShape::array(order_shape()).display_name(),
            "array[Order]"
        );
        assert_eq!(TypeShape::nullable(TypeShape::int()).display_name(), "int?");
    }
}
