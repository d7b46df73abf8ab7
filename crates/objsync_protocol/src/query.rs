//! Predicate query language.
//!
//! Queries are plain data so they can be persisted as part of a sync scope
//! and shipped to a remote store. Both reference stores evaluate them with
//! [`Query::matches`].

use crate::error::{ProtocolError, ProtocolResult};
use crate::object::Object;
use objsync_codec::Value;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Flags for a regex predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexFlags {
    /// `i`: case-insensitive matching.
    #[serde(default)]
    pub case_insensitive: bool,
    /// `m`: `^` and `$` match at line boundaries.
    #[serde(default)]
    pub multiline: bool,
    /// `s`: `.` also matches newlines.
    #[serde(default)]
    pub dot_all: bool,
    /// `x`: whitespace and `#` comments in the pattern are ignored.
    #[serde(default)]
    pub extended: bool,
}

impl RegexFlags {
    /// Parses a flag string such as `"im"`.
    pub fn parse(flags: &str) -> ProtocolResult<Self> {
        let mut parsed = Self::default();
        for c in flags.chars() {
            match c {
                'i' => parsed.case_insensitive = true,
                'm' => parsed.multiline = true,
                's' => parsed.dot_all = true,
                'x' => parsed.extended = true,
                other => {
                    return Err(ProtocolError::InvalidQuery(format!(
                        "unknown regex flag `{other}`"
                    )))
                }
            }
        }
        Ok(parsed)
    }
}

/// A predicate over objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// Matches every object.
    MatchAll,
    /// Field equals value (any element, for array fields).
    Eq {
        /// Field path.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Negation of [`Query::Eq`].
    Ne {
        /// Field path.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field is less than value.
    Lt {
        /// Field path.
        field: String,
        /// Bound.
        value: Value,
    },
    /// Field is less than or equal to value.
    Lte {
        /// Field path.
        field: String,
        /// Bound.
        value: Value,
    },
    /// Field is greater than value.
    Gt {
        /// Field path.
        field: String,
        /// Bound.
        value: Value,
    },
    /// Field is greater than or equal to value.
    Gte {
        /// Field path.
        field: String,
        /// Bound.
        value: Value,
    },
    /// Field equals one of the values.
    In {
        /// Field path.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// Field equals none of the values.
    Nin {
        /// Field path.
        field: String,
        /// Rejected values.
        values: Vec<Value>,
    },
    /// Array field contains every one of the values.
    All {
        /// Field path.
        field: String,
        /// Required elements.
        values: Vec<Value>,
    },
    /// Field is present (a stored null counts as present).
    Exists {
        /// Field path.
        field: String,
    },
    /// Field is absent.
    NotExists {
        /// Field path.
        field: String,
    },
    /// String field matches a regular expression.
    Regex {
        /// Field path.
        field: String,
        /// Pattern.
        pattern: String,
        /// Matching flags.
        #[serde(default)]
        flags: RegexFlags,
    },
    /// Negation.
    Not {
        /// Negated query.
        query: Box<Query>,
    },
    /// Every clause matches.
    And {
        /// Clauses.
        queries: Vec<Query>,
    },
    /// At least one clause matches.
    Or {
        /// Clauses.
        queries: Vec<Query>,
    },
}

impl Default for Query {
    fn default() -> Self {
        Query::MatchAll
    }
}

impl Query {
    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field != value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field in values`.
    pub fn in_values<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Query::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field not in values`.
    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Query::Nin {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Array `field` is a superset of `values`.
    pub fn all<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Query::All {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field` is present.
    pub fn exists(field: impl Into<String>) -> Self {
        Query::Exists {
            field: field.into(),
        }
    }

    /// `field` is absent.
    pub fn not_exists(field: impl Into<String>) -> Self {
        Query::NotExists {
            field: field.into(),
        }
    }

    /// `field` matches `pattern`.
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>, flags: RegexFlags) -> Self {
        Query::Regex {
            field: field.into(),
            pattern: pattern.into(),
            flags,
        }
    }

    /// Logical negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(query: Query) -> Self {
        Query::Not {
            query: Box::new(query),
        }
    }

    /// Conjunction of two queries.
    ///
    /// `MatchAll` operands are dropped and nested `And`s are flattened.
    #[must_use]
    pub fn and(self, other: Query) -> Self {
        let mut queries = Vec::new();
        for q in [self, other] {
            match q {
                Query::MatchAll => {}
                Query::And { queries: inner } => queries.extend(inner),
                q => queries.push(q),
            }
        }
        match queries.len() {
            0 => Query::MatchAll,
            1 => queries.remove(0),
            _ => Query::And { queries },
        }
    }

    /// Disjunction of two queries.
    #[must_use]
    pub fn or(self, other: Query) -> Self {
        if matches!(self, Query::MatchAll) || matches!(other, Query::MatchAll) {
            return Query::MatchAll;
        }
        let mut queries = Vec::new();
        for q in [self, other] {
            match q {
                Query::Or { queries: inner } => queries.extend(inner),
                q => queries.push(q),
            }
        }
        Query::Or { queries }
    }

    /// Checks the query can be evaluated (currently: every regex compiles).
    pub fn validate(&self) -> ProtocolResult<()> {
        match self {
            Query::Regex { pattern, flags, .. } => compile(pattern, *flags).map(|_| ()),
            Query::Not { query } => query.validate(),
            Query::And { queries } | Query::Or { queries } => {
                queries.iter().try_for_each(Query::validate)
            }
            _ => Ok(()),
        }
    }

    /// Evaluates the query against an object.
    ///
    /// The soft-delete flag is not consulted here; stores filter deleted
    /// rows separately.
    pub fn matches(&self, object: &Object) -> ProtocolResult<bool> {
        let matched = match self {
            Query::MatchAll => true,
            Query::Eq { field, value } => field_eq(object, field, value),
            Query::Ne { field, value } => !field_eq(object, field, value),
            Query::Lt { field, value } => field_cmp(object, field, value, |o| o == Ordering::Less),
            Query::Lte { field, value } => {
                field_cmp(object, field, value, |o| o != Ordering::Greater)
            }
            Query::Gt { field, value } => {
                field_cmp(object, field, value, |o| o == Ordering::Greater)
            }
            Query::Gte { field, value } => field_cmp(object, field, value, |o| o != Ordering::Less),
            Query::In { field, values } => values.iter().any(|v| field_eq(object, field, v)),
            Query::Nin { field, values } => !values.iter().any(|v| field_eq(object, field, v)),
            Query::All { field, values } => match object.field_value(field).as_deref() {
                Some(Value::Array(items)) => values
                    .iter()
                    .all(|wanted| items.iter().any(|item| item.loose_eq(wanted))),
                _ => false,
            },
            Query::Exists { field } => object.field_value(field).is_some(),
            Query::NotExists { field } => object.field_value(field).is_none(),
            Query::Regex {
                field,
                pattern,
                flags,
            } => {
                let regex = compile(pattern, *flags)?;
                match object.field_value(field).as_deref() {
                    Some(Value::String(s)) => regex.is_match(s),
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|s| regex.is_match(s)),
                    _ => false,
                }
            }
            Query::Not { query } => !query.matches(object)?,
            Query::And { queries } => {
                for q in queries {
                    if !q.matches(object)? {
                        return Ok(false);
                    }
                }
                true
            }
            Query::Or { queries } => {
                for q in queries {
                    if q.matches(object)? {
                        return Ok(true);
                    }
                }
                false
            }
        };
        Ok(matched)
    }
}

fn compile(pattern: &str, flags: RegexFlags) -> ProtocolResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multiline)
        .dot_matches_new_line(flags.dot_all)
        .ignore_whitespace(flags.extended)
        .build()
        .map_err(|e| ProtocolError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn field_eq(object: &Object, field: &str, expected: &Value) -> bool {
    match object.field_value(field).as_deref() {
        // A missing field only equals null.
        None => expected.is_null(),
        Some(Value::Array(items)) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|item| item.loose_eq(expected))
        }
        Some(actual) => actual.loose_eq(expected),
    }
}

fn field_cmp(object: &Object, field: &str, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match object.field_value(field).as_deref() {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.compare(bound))
            .any(&accept),
        Some(actual) => actual.compare(bound).is_some_and(accept),
    }
}
