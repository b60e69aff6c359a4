//! Type descriptors and their JSON Schema translation.
//!
//! Every parameter a registered function exposes to the model is described by
//! a [`ParamType`]. `json_schema` turns a descriptor into the schema fragment
//! sent with the request; [`decode`] performs the inverse on the textual
//! arguments the model sends back.

mod decode;

pub use decode::decode;

use serde_json::{Map, Value, json};

use crate::core::error::GptError;

/// Type of a single function parameter or record field.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    /// An optional value. Nesting Optional inside Optional is unsupported.
    Optional(Box<ParamType>),
    List(Box<ParamType>),
    /// Key and value types. Only string keys translate; anything else is an
    /// `UnsupportedKeyType` error.
    Map(Box<ParamType>, Box<ParamType>),
    Record(RecordType),
}

/// A named structure with ordered fields, akin to a dataclass.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<Field>,
}

/// One field of a record. A field is optional iff its type is `Optional`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: ParamType,
}

impl ParamType {
    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    pub fn list(item: ParamType) -> Self {
        ParamType::List(Box::new(item))
    }

    pub fn map(key: ParamType, value: ParamType) -> Self {
        ParamType::Map(Box::new(key), Box::new(value))
    }

    /// Short name used in error messages.
    pub fn name(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Integer => "integer".to_string(),
            ParamType::Number => "number".to_string(),
            ParamType::Boolean => "boolean".to_string(),
            ParamType::Optional(inner) => format!("Optional<{}>", inner.name()),
            ParamType::List(item) => format!("List<{}>", item.name()),
            ParamType::Map(key, value) => format!("Map<{}, {}>", key.name(), value.name()),
            ParamType::Record(record) => record.name.clone(),
        }
    }
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
        });
        self
    }
}

/// Translate a type descriptor into a JSON Schema fragment.
///
/// Records nested inside another record are emitted once under a
/// `definitions` key on the outermost record and referenced by `$ref`
/// everywhere they occur, so shared nested types are not re-inlined.
pub fn json_schema(ty: &ParamType) -> Result<Value, GptError> {
    match ty {
        ParamType::String => Ok(json!({"type": "string"})),
        ParamType::Integer => Ok(json!({"type": "integer"})),
        ParamType::Number => Ok(json!({"type": "number"})),
        ParamType::Boolean => Ok(json!({"type": "boolean"})),
        ParamType::Optional(inner) => {
            // Optionality is carried by the enclosing function's required
            // list, not by the schema itself.
            reject_nested_optional(inner)?;
            json_schema(inner)
        }
        ParamType::List(item) => Ok(json!({"type": "array", "items": json_schema(item)?})),
        ParamType::Map(key, value) => {
            require_string_key(key)?;
            Ok(json!({"type": "object", "additionalProperties": json_schema(value)?}))
        }
        ParamType::Record(record) => {
            let mut definitions = Map::new();
            let mut schema = record_schema(record, &mut definitions)?;
            if !definitions.is_empty() {
                if let Value::Object(object) = &mut schema {
                    object.insert("definitions".to_string(), Value::Object(definitions));
                }
            }
            Ok(schema)
        }
    }
}

fn record_schema(
    record: &RecordType,
    definitions: &mut Map<String, Value>,
) -> Result<Value, GptError> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in &record.fields {
        properties.insert(
            field.name.clone(),
            nested_schema(&field.ty, definitions)?,
        );
        if !matches!(field.ty, ParamType::Optional(_)) {
            required.push(Value::String(field.name.clone()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    schema.insert("required".to_string(), Value::Array(required));
    if let Some(description) = &record.description {
        schema.insert("description".to_string(), json!(description));
    }
    Ok(Value::Object(schema))
}

/// Schema for a type occurring inside a record. Nested records collapse to a
/// `$ref` into the shared definitions table.
fn nested_schema(
    ty: &ParamType,
    definitions: &mut Map<String, Value>,
) -> Result<Value, GptError> {
    match ty {
        ParamType::Record(record) => {
            if !definitions.contains_key(&record.name) {
                // Reserve the slot first so self-referential records terminate.
                definitions.insert(record.name.clone(), Value::Null);
                let schema = record_schema(record, definitions)?;
                definitions.insert(record.name.clone(), schema);
            }
            Ok(json!({"$ref": format!("#/definitions/{}", record.name)}))
        }
        ParamType::Optional(inner) => {
            reject_nested_optional(inner)?;
            nested_schema(inner, definitions)
        }
        ParamType::List(item) => Ok(json!({"type": "array", "items": nested_schema(item, definitions)?})),
        ParamType::Map(key, value) => {
            require_string_key(key)?;
            Ok(json!({"type": "object", "additionalProperties": nested_schema(value, definitions)?}))
        }
        _ => json_schema(ty),
    }
}

fn require_string_key(key: &ParamType) -> Result<(), GptError> {
    if matches!(key, ParamType::String) {
        Ok(())
    } else {
        Err(GptError::UnsupportedKeyType(key.name()))
    }
}

fn reject_nested_optional(inner: &ParamType) -> Result<(), GptError> {
    if matches!(inner, ParamType::Optional(_)) {
        Err(GptError::UnsupportedType("Optional<Optional>".to_string()))
    } else {
        Ok(())
    }
}
