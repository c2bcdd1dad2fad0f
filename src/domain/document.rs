//! Generic document representation shared by every store backend.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
        }
    }

    // Null < bool < number < timestamp < string; integers and doubles compare numerically.
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Double(_) => 2,
            Self::Timestamp(_) => 3,
            Self::String(_) => 4,
        }
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Integer(a), Self::Double(b)) => (*a as f64).total_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self { Self::String(v.to_string()) }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self { Self::String(v) }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self { Self::Timestamp(v) }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("field `{field}` holds {found}, expected {expected}")]
    TypeMismatch { field: String, expected: &'static str, found: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self { id: id.into(), fields }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> { self.fields.get(field) }

    pub fn get_string(&self, field: &str) -> Result<Option<&str>, DecodeError> {
        self.typed(field, "string", |v| match v {
            FieldValue::String(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn get_bool(&self, field: &str) -> Result<Option<bool>, DecodeError> {
        self.typed(field, "bool", |v| match v {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    /// Doubles are truncated toward zero.
    pub fn get_integer(&self, field: &str) -> Result<Option<i64>, DecodeError> {
        self.typed(field, "integer", |v| match v {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Double(d) => Some(*d as i64),
            _ => None,
        })
    }

    pub fn get_timestamp(&self, field: &str) -> Result<Option<DateTime<Utc>>, DecodeError> {
        self.typed(field, "timestamp", |v| match v {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        })
    }

    // Absent and null fields read as `None`; any other type than `expected` is an error.
    fn typed<'a, T>(
        &'a self,
        field: &str,
        expected: &'static str,
        extract: impl FnOnce(&'a FieldValue) -> Option<T>,
    ) -> Result<Option<T>, DecodeError> {
        match self.fields.get(field) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(value) => extract(value).map(Some).ok_or_else(|| DecodeError::TypeMismatch {
                field: field.to_string(),
                expected,
                found: value.type_name(),
            }),
        }
    }
}
