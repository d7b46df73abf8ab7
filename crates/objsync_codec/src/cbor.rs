//! CBOR encoding for persisted state.
//!
//! Anything that implements serde's traits can be written this way; the
//! sync scope registry is the main user.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fields, Value};

    #[test]
    fn value_roundtrip() {
        let fields = Fields::new()
            .with("name", "Alice")
            .with("age", 30i64)
            .with("ratio", 0.25)
            .with("tags", vec!["x", "y"])
            .with("nested", Fields::new().with("ok", true))
            .with("nothing", ());
        let value = Value::Object(fields);

        let bytes = to_cbor(&value).unwrap();
        let decoded: Value = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn integer_stays_integer() {
        let bytes = to_cbor(&Value::Integer(7)).unwrap();
        let decoded: Value = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, Value::Integer(7));
    }

    #[test]
    fn garbage_is_rejected() {
        let result: CodecResult<Value> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
