//! Self-describing method signatures.

use dynrpc_core::describe_member;
use serde_json::{json, Map, Value};

use super::descriptor::{MethodDescriptor, TypeDescriptor};

/// Message of the informational response returned in introspection mode.
pub const INTROSPECTION_MESSAGE: &str = "type information";

/// Describes a method's parameters and return type.
///
/// Parameters render like object fields; a parameter without a default is
/// required.
#[must_use]
pub fn describe_method(target: &TypeDescriptor, method: &MethodDescriptor) -> Value {
    let mut params = Map::new();
    for param in method.params() {
        let (name, desc) = describe_member(
            &param.name,
            &param.shape,
            param.is_required(),
            param.default_value.as_ref(),
            param.description.as_deref(),
        );
        params.insert(name, desc);
    }
    json!({
        "target": target.name(),
        "action": method.name(),
        "params": params,
        "returns": method.return_shape().describe(),
    })
}

#[cfg(test)]
mod tests {
    use dynrpc_core::{FieldDef, ObjectShape, TypeShape};

    use super::*;
    use crate::service::descriptor::ParamDef;

    #[test]
    fn describes_params_and_return() {
        let person = ObjectShape::new("Person")
            .field(FieldDef::new("name", TypeShape::string()).required())
            .field(FieldDef::new("secret", TypeShape::string()).ignored())
            .field(
                FieldDef::new("tags", TypeShape::array(TypeShape::string()))
                    .description("free-form labels"),
            )
            .into_shape();
        let method = MethodDescriptor::new("Register")
            .param(ParamDef::new("person", person))
            .param(
                ParamDef::new("notify", TypeShape::nullable(TypeShape::bool()))
                    .default_value(true),
            )
            .returns(TypeShape::map(TypeShape::string(), TypeShape::int()));
        let ty = TypeDescriptor::named("crm.People").method(method);

        let desc = describe_method(&ty, &ty.methods()[0]);
        assert_eq!(
            desc,
            json!({
                "target": "crm.People",
                "action": "Register",
                "params": {
                    "person*": {
                        "name*": "string",
                        "tags": {"type": "array[string]", "description": "free-form labels"},
                    },
                    "notify": {"type": "bool?", "default": true},
                },
                "returns": "dict[string,int]",
            })
        );
    }

    #[test]
    fn void_method_without_params() {
        let ty = TypeDescriptor::named("a.T").method(MethodDescriptor::new("Ping"));
        let desc = describe_method(&ty, &ty.methods()[0]);
        assert_eq!(desc["params"], json!({}));
        assert_eq!(desc["returns"], json!("void"));
    }
}
