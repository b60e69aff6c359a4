//! Decoding of textual argument values back into typed JSON values.
//!
//! The model sends function arguments as JSON text, but primitives often
//! arrive as bare literals (`hello` rather than `"hello"`). Decoding is
//! deliberately permissive for the string case: any text that is not a JSON
//! string is taken verbatim.

use serde_json::{Map, Value};

use super::{ParamType, RecordType};
use crate::core::error::GptError;

/// Decode JSON-encoded text into a value matching `ty`.
pub fn decode(text: &str, ty: &ParamType) -> Result<Value, GptError> {
    match ty {
        ParamType::Optional(inner) => {
            if matches!(**inner, ParamType::Optional(_)) {
                return Err(GptError::UnsupportedType("Optional<Optional>".to_string()));
            }
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "null" {
                Ok(Value::Null)
            } else {
                decode(text, inner)
            }
        }
        ParamType::String => {
            // A quoted JSON string unquotes; everything else is the literal text.
            match serde_json::from_str::<Value>(text) {
                Ok(Value::String(s)) => Ok(Value::String(s)),
                _ => Ok(Value::String(text.to_string())),
            }
        }
        ParamType::Integer | ParamType::Number | ParamType::Boolean => {
            let value: Value = serde_json::from_str(text.trim())
                .map_err(|_| mismatch(ty, text))?;
            check_scalar(value, ty, text)
        }
        ParamType::List(item) => {
            let value: Value = serde_json::from_str(text).map_err(|_| mismatch(ty, text))?;
            let Value::Array(items) = value else {
                return Err(mismatch(ty, text));
            };
            let decoded = items
                .into_iter()
                .map(|element| decode_value(element, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(decoded))
        }
        ParamType::Map(key, value_ty) => {
            if !matches!(**key, ParamType::String) {
                return Err(GptError::UnsupportedKeyType(key.name()));
            }
            let value: Value = serde_json::from_str(text).map_err(|_| mismatch(ty, text))?;
            let Value::Object(entries) = value else {
                return Err(mismatch(ty, text));
            };
            decode_entries(entries, value_ty)
        }
        ParamType::Record(record) => {
            let value: Value = serde_json::from_str(text).map_err(|_| mismatch(ty, text))?;
            let Value::Object(fields) = value else {
                return Err(mismatch(ty, text));
            };
            decode_record(fields, record)
        }
    }
}

/// Decode an already-parsed value. Elements inside lists, maps and records may
/// be native JSON values or re-serialized text; a string element for a
/// non-string type is decoded again as text.
fn decode_value(value: Value, ty: &ParamType) -> Result<Value, GptError> {
    match (value, ty) {
        (Value::String(s), ParamType::String) => Ok(Value::String(s)),
        (Value::String(s), _) => decode(&s, ty),
        (Value::Null, ParamType::Optional(_)) => Ok(Value::Null),
        (value, ParamType::Optional(inner)) => {
            if matches!(**inner, ParamType::Optional(_)) {
                return Err(GptError::UnsupportedType("Optional<Optional>".to_string()));
            }
            decode_value(value, inner)
        }
        (value @ Value::Number(_), ParamType::Integer) => {
            check_scalar(value, ty, "")
        }
        (value @ Value::Number(_), ParamType::Number) => Ok(value),
        (value @ Value::Bool(_), ParamType::Boolean) => Ok(value),
        (Value::Array(items), ParamType::List(item)) => {
            let decoded = items
                .into_iter()
                .map(|element| decode_value(element, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(decoded))
        }
        (Value::Object(entries), ParamType::Map(key, value_ty)) => {
            if !matches!(**key, ParamType::String) {
                return Err(GptError::UnsupportedKeyType(key.name()));
            }
            decode_entries(entries, value_ty)
        }
        (Value::Object(fields), ParamType::Record(record)) => decode_record(fields, record),
        (found, _) => Err(GptError::TypeMismatch {
            expected: ty.name(),
            found: found.to_string(),
        }),
    }
}

fn decode_entries(entries: Map<String, Value>, value_ty: &ParamType) -> Result<Value, GptError> {
    let mut decoded = Map::new();
    for (key, value) in entries {
        decoded.insert(key, decode_value(value, value_ty)?);
    }
    Ok(Value::Object(decoded))
}

fn decode_record(mut fields: Map<String, Value>, record: &RecordType) -> Result<Value, GptError> {
    let mut decoded = Map::new();
    for field in &record.fields {
        match fields.remove(&field.name) {
            Some(value) => {
                decoded.insert(field.name.clone(), decode_value(value, &field.ty)?);
            }
            None if matches!(field.ty, ParamType::Optional(_)) => {
                decoded.insert(field.name.clone(), Value::Null);
            }
            None => {
                return Err(GptError::TypeMismatch {
                    expected: format!("field `{}` of {}", field.name, record.name),
                    found: "nothing".to_string(),
                });
            }
        }
    }
    Ok(Value::Object(decoded))
}

fn check_scalar(value: Value, ty: &ParamType, text: &str) -> Result<Value, GptError> {
    let ok = match ty {
        ParamType::Integer => matches!(&value, Value::Number(n) if n.is_i64() || n.is_u64()),
        ParamType::Number => matches!(&value, Value::Number(_)),
        ParamType::Boolean => matches!(&value, Value::Bool(_)),
        _ => false,
    };
    if ok {
        Ok(value)
    } else if text.is_empty() {
        Err(GptError::TypeMismatch {
            expected: ty.name(),
            found: value.to_string(),
        })
    } else {
        Err(mismatch(ty, text))
    }
}

fn mismatch(ty: &ParamType, text: &str) -> GptError {
    GptError::TypeMismatch {
        expected: ty.name(),
        found: text.to_string(),
    }
}
