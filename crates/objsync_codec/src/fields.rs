//! Document field map with type-checked accessors.

use crate::error::{FieldError, FieldResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// The field bag of a document.
///
/// Keys are kept sorted so two documents with the same content always
/// serialize to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the number of top-level fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if a value (possibly null) is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Unchecked lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Lookup that reports a missing key as an error.
    pub fn get_value(&self, key: &str) -> FieldResult<&Value> {
        self.0.get(key).ok_or_else(|| FieldError::Missing {
            key: key.to_string(),
        })
    }

    /// Returns the string stored under `key`.
    pub fn get_str(&self, key: &str) -> FieldResult<&str> {
        let value = self.get_value(key)?;
        value.as_str().ok_or_else(|| wrong_type(key, "string", value))
    }

    /// Returns the integer stored under `key`.
    pub fn get_i64(&self, key: &str) -> FieldResult<i64> {
        let value = self.get_value(key)?;
        value
            .as_integer()
            .ok_or_else(|| wrong_type(key, "integer", value))
    }

    /// Returns the number stored under `key`, widening integers.
    pub fn get_f64(&self, key: &str) -> FieldResult<f64> {
        let value = self.get_value(key)?;
        value.as_f64().ok_or_else(|| wrong_type(key, "number", value))
    }

    /// Returns the boolean stored under `key`.
    pub fn get_bool(&self, key: &str) -> FieldResult<bool> {
        let value = self.get_value(key)?;
        value.as_bool().ok_or_else(|| wrong_type(key, "boolean", value))
    }

    /// Returns the array stored under `key`.
    pub fn get_array(&self, key: &str) -> FieldResult<&[Value]> {
        let value = self.get_value(key)?;
        value.as_array().ok_or_else(|| wrong_type(key, "array", value))
    }

    /// Returns the nested object stored under `key`.
    pub fn get_object(&self, key: &str) -> FieldResult<&Fields> {
        let value = self.get_value(key)?;
        value
            .as_object()
            .ok_or_else(|| wrong_type(key, "object", value))
    }

    /// Resolves a dotted path (`a.b.c`) through nested objects.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            None => self.get(path),
            Some((head, rest)) => self.get(head)?.get_path(rest),
        }
    }

    /// Stores a value, returning the previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style variant of [`Fields::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Keeps only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.0.retain(|k, v| keep(k, v));
    }

    /// Iterates fields in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, Value> {
        self.0.keys()
    }
}

fn wrong_type(key: &str, expected: &'static str, actual: &Value) -> FieldError {
    FieldError::WrongType {
        key: key.to_string(),
        expected,
        actual: actual.type_name(),
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
