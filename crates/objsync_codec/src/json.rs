//! JSON interop.

use crate::error::{CodecError, CodecResult};
use crate::fields::Fields;
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to a JSON string.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Decodes a value from a JSON string.
///
/// # Errors
///
/// Returns an error if the text is not valid JSON for `T`.
pub fn from_json<T: DeserializeOwned>(text: &str) -> CodecResult<T> {
    serde_json::from_str(text).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl TryFrom<serde_json::Value> for Fields {
    type Error = CodecError;

    fn try_from(json: serde_json::Value) -> CodecResult<Self> {
        match Value::from(json) {
            Value::Object(fields) => Ok(fields),
            other => Err(CodecError::invalid_structure(format!(
                "expected a JSON object, found {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_from_json_object() {
        let fields = Fields::try_from(json!({"name": "Bob", "age": 41, "w": 1.5})).unwrap();
        assert_eq!(fields.get_str("name").unwrap(), "Bob");
        assert_eq!(fields.get_i64("age").unwrap(), 41);
        assert_eq!(fields.get_f64("w").unwrap(), 1.5);
    }

    #[test]
    fn fields_from_non_object_fails() {
        let err = Fields::try_from(json!([1, 2])).unwrap_err();
        assert!(matches!(err, CodecError::InvalidStructure { .. }));
    }

    #[test]
    fn json_text_roundtrip() {
        let fields = Fields::new().with("a", 1i64).with("b", vec![true, false]);
        let text = to_json(&fields).unwrap();
        assert_eq!(text, r#"{"a":1,"b":[true,false]}"#);
        let back: Fields = from_json(&text).unwrap();
        assert_eq!(back, fields);
    }
}
