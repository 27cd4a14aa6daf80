//! JSON Schema to backend schema conversion
//!
//! Unknown or missing types become `TYPE_UNSPECIFIED` instead of failing the
//! request, so a sloppy tool declaration still reaches the model.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::protocol::google::{GoogleSchema, GoogleSchemaType};

/// Schema for a function declaration's `parameters`, always an object
pub fn function_parameters(parameters: Option<&Value>) -> Option<GoogleSchema> {
    parameters.map(|value| GoogleSchema {
        schema_type: GoogleSchemaType::Object,
        ..convert(value)
    })
}

/// Structural conversion of one JSON Schema node
pub fn convert(value: &Value) -> GoogleSchema {
    let Some(node) = value.as_object() else {
        return GoogleSchema::default();
    };

    let schema_type = node.get("type").map_or(GoogleSchemaType::Unspecified, schema_type);

    let items = node
        .get("items")
        .filter(|_| schema_type == GoogleSchemaType::Array)
        .map(|items| Box::new(convert(items)));

    let properties = node.get("properties").and_then(Value::as_object).map(|props| {
        props
            .iter()
            .map(|(name, schema)| (name.clone(), convert(schema)))
            .collect::<BTreeMap<_, _>>()
    });

    let required = node.get("required").and_then(Value::as_array).map(|names| {
        names
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect::<Vec<_>>()
    });

    GoogleSchema {
        schema_type,
        description: node.get("description").and_then(Value::as_str).map(str::to_owned),
        enum_values: node.get("enum").and_then(Value::as_array).map(|values| stringify_enum(values)),
        items,
        properties,
        required: required.filter(|r| !r.is_empty()),
    }
}

/// `"string"` or `["string", "null"]`
fn schema_type(value: &Value) -> GoogleSchemaType {
    match value {
        Value::String(name) => type_tag(name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null")
            .map_or(GoogleSchemaType::Unspecified, type_tag),
        _ => GoogleSchemaType::Unspecified,
    }
}

fn type_tag(name: &str) -> GoogleSchemaType {
    match name {
        "string" => GoogleSchemaType::String,
        "integer" => GoogleSchemaType::Integer,
        "number" => GoogleSchemaType::Number,
        "boolean" => GoogleSchemaType::Boolean,
        "array" => GoogleSchemaType::Array,
        "object" => GoogleSchemaType::Object,
        _ => GoogleSchemaType::Unspecified,
    }
}

fn stringify_enum(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}
