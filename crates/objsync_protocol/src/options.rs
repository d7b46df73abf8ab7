//! Find options: paging, ordering, projection, soft-delete visibility.

use crate::object::Object;
use objsync_codec::{Fields, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Field path, metadata paths included.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortKey {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Field projection. Inclusion and exclusion cannot be mixed; `_id`
/// exclusion is toggled independently of either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Projection {
    /// Keep only the listed fields.
    Include {
        /// Field names to keep.
        fields: Vec<String>,
        /// Drop `_id` from the projected document.
        #[serde(default)]
        exclude_id: bool,
    },
    /// Drop the listed fields.
    Exclude {
        /// Field names to drop.
        fields: Vec<String>,
        /// Drop `_id` from the projected document.
        #[serde(default)]
        exclude_id: bool,
    },
}

impl Projection {
    /// Projects an object into a flat document view with `_id` folded in.
    pub fn project(&self, object: &Object) -> Fields {
        let (mut fields, exclude_id) = match self {
            Projection::Include { fields, exclude_id } => {
                let mut body = object.fields.clone();
                body.retain(|k, _| fields.iter().any(|f| f == k));
                (body, *exclude_id)
            }
            Projection::Exclude { fields, exclude_id } => {
                let mut body = object.fields.clone();
                body.retain(|k, _| !fields.iter().any(|f| f == k));
                (body, *exclude_id)
            }
        };
        if !exclude_id {
            fields.set("_id", Value::String(object.id.to_string()));
        }
        fields
    }
}

/// Options for a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    /// Maximum number of results. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Number of leading results to skip.
    #[serde(default)]
    pub skip: usize,
    /// Sort keys, most significant first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<SortKey>,
    /// Optional projection for callers that want document views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    /// Include soft-deleted objects.
    #[serde(default)]
    pub include_deleted: bool,
}

impl FindOptions {
    /// Default options: everything live, unsorted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the skip.
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn order_by(mut self, key: SortKey) -> Self {
        self.order.push(key);
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Includes soft-deleted objects.
    #[must_use]
    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Compares two objects under this option's sort keys.
    pub fn compare(&self, a: &Object, b: &Object) -> Ordering {
        for key in &self.order {
            let left = a.field_value(&key.field);
            let right = b.field_value(&key.field);
            let ord = match (left.as_deref(), right.as_deref()) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(l), Some(r)) => l.cmp_total(r),
            };
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Applies ordering, skip and limit to an already filtered result set.
    pub fn apply(&self, mut objects: Vec<Object>) -> Vec<Object> {
        if !self.order.is_empty() {
            objects.sort_by(|a, b| self.compare(a, b));
        }
        let iter = objects.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectId;

    fn objects() -> Vec<Object> {
        vec![
            Object::new("b", ObjectId::new("c"), Fields::new().with("n", 2i64)),
            Object::new("b", ObjectId::new("a"), Fields::new().with("n", 1i64)),
            Object::new("b", ObjectId::new("b"), Fields::new().with("n", 2i64)),
            Object::new("b", ObjectId::new("d"), Fields::new()),
        ]
    }

    fn ids(objects: &[Object]) -> Vec<&str> {
        objects.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn multi_key_sort() {
        let options = FindOptions::new()
            .order_by(SortKey::desc("n"))
            .order_by(SortKey::asc("_id"));
        let sorted = options.apply(objects());
        assert_eq!(ids(&sorted), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn skip_and_limit() {
        let options = FindOptions::new()
            .order_by(SortKey::asc("_id"))
            .with_skip(1)
            .with_limit(2);
        assert_eq!(ids(&options.apply(objects())), vec!["b", "c"]);

        let past_end = FindOptions::new().with_skip(10);
        assert!(past_end.apply(objects()).is_empty());
    }

    #[test]
    fn include_projection() {
        let object = Object::new(
            "b",
            ObjectId::new("x"),
            Fields::new().with("a", 1i64).with("b", 2i64).with("c", 3i64),
        );
        let projection = Projection::Include {
            fields: vec!["a".into(), "c".into()],
            exclude_id: false,
        };
        let view = projection.project(&object);
        assert_eq!(view.len(), 3);
        assert_eq!(view.get_str("_id").unwrap(), "x");
        assert!(view.get("b").is_none());
    }

    #[test]
    fn exclude_projection_without_id() {
        let object = Object::new(
            "b",
            ObjectId::new("x"),
            Fields::new().with("a", 1i64).with("secret", "s"),
        );
        let projection = Projection::Exclude {
            fields: vec!["secret".into()],
            exclude_id: true,
        };
        let view = projection.project(&object);
        assert_eq!(view, Fields::new().with("a", 1i64));
    }
}
