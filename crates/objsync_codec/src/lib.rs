//! # objsync Codec
//!
//! Document values and codecs for objsync.
//!
//! This crate provides:
//! - [`Value`], a tagged JSON value (null, bool, integer, float, string,
//!   array, object)
//! - [`Fields`], the key-sorted field bag of a document, with type-checked
//!   accessors that tell a missing key apart from a value of the wrong type
//! - CBOR helpers used for persisted engine state
//! - JSON helpers used on the wire and in tooling
//!
//! ## Usage
//!
//! ```
//! use objsync_codec::{Fields, FieldError};
//!
//! let fields = Fields::new().with("title", "Groceries").with("items", 3i64);
//!
//! assert_eq!(fields.get_str("title").unwrap(), "Groceries");
//! assert!(matches!(fields.get_str("items"), Err(FieldError::WrongType { .. })));
//! assert!(matches!(fields.get_str("owner"), Err(FieldError::Missing { .. })));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod fields;
mod json;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult, FieldError, FieldResult};
pub use fields::Fields;
pub use json::{from_json, to_json};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-z]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn cbor_preserves_values(value in arb_value()) {
            let bytes = to_cbor(&value).unwrap();
            let decoded: Value = from_cbor(&bytes).unwrap();
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn total_order_is_reflexive(value in arb_value()) {
            prop_assert_eq!(value.cmp_total(&value), std::cmp::Ordering::Equal);
        }
    }
}
