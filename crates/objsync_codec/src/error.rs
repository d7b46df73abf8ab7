//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for type-checked field access.
pub type FieldResult<T> = Result<T, FieldError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The decoded document has an unexpected shape.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

/// Errors from type-checked access into a [`crate::Fields`] map.
///
/// A key that is absent and a key holding a value of another type are
/// reported differently so callers can tell "not set" from "set wrong".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// No value is stored under the key.
    #[error("missing field `{key}`")]
    Missing {
        /// The key that was looked up.
        key: String,
    },

    /// A value is stored under the key, but it has another type.
    #[error("field `{key}` has type {actual}, expected {expected}")]
    WrongType {
        /// The key that was looked up.
        key: String,
        /// The type the caller asked for.
        expected: &'static str,
        /// The type actually stored.
        actual: &'static str,
    },
}

impl FieldError {
    /// Returns true if the key was absent.
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldError::Missing { .. })
    }

    /// Returns true if the key held a value of the wrong type.
    pub fn is_wrong_type(&self) -> bool {
        matches!(self, FieldError::WrongType { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_error_display() {
        let err = FieldError::Missing { key: "name".into() };
        assert_eq!(err.to_string(), "missing field `name`");
        assert!(err.is_missing());

        let err = FieldError::WrongType {
            key: "age".into(),
            expected: "integer",
            actual: "string",
        };
        assert_eq!(err.to_string(), "field `age` has type string, expected integer");
        assert!(err.is_wrong_type());
    }
}
