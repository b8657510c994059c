//! Conversion between remote rows and domain types.
//!
//! Each domain type maps both ways explicitly, field by field. A row missing
//! a required field, or holding the wrong JSON type, is a [`MappingError`]
//! naming the table and column, never a silently defaulted value.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::codec::parse_timestamp;
use crate::remote::Row;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("{resource} row is not a JSON object")]
    NotAnObject { resource: &'static str },

    #[error("{resource}.{field} is missing")]
    MissingField {
        resource: &'static str,
        field: &'static str,
    },

    #[error("{resource}.{field} should be {expected}")]
    InvalidField {
        resource: &'static str,
        field: &'static str,
        expected: &'static str,
    },
}

/// A domain type with a remote table representation.
pub trait RowMapping: Sized {
    /// Remote table name.
    const RESOURCE: &'static str;

    fn from_row(row: &Row) -> Result<Self, MappingError>;

    fn to_row(&self) -> Row;
}

/// Typed field access over one row, producing errors that name the column.
pub struct RowReader<'a> {
    resource: &'static str,
    fields: &'a Map<String, Value>,
}

impl<'a> RowReader<'a> {
    pub fn new(resource: &'static str, row: &'a Row) -> Result<Self, MappingError> {
        match row {
            Value::Object(fields) => Ok(Self { resource, fields }),
            _ => Err(MappingError::NotAnObject { resource }),
        }
    }

    fn missing(&self, field: &'static str) -> MappingError {
        MappingError::MissingField {
            resource: self.resource,
            field,
        }
    }

    fn invalid(&self, field: &'static str, expected: &'static str) -> MappingError {
        MappingError::InvalidField {
            resource: self.resource,
            field,
            expected,
        }
    }

    /// The raw value, treating JSON `null` as absent.
    fn value(&self, field: &'static str) -> Option<&'a Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    fn required(&self, field: &'static str) -> Result<&'a Value, MappingError> {
        self.value(field).ok_or_else(|| self.missing(field))
    }

    pub fn string(&self, field: &'static str) -> Result<String, MappingError> {
        self.required(field)?
            .as_str()
            .map(String::from)
            .ok_or_else(|| self.invalid(field, "a string"))
    }

    pub fn opt_string(&self, field: &'static str) -> Result<Option<String>, MappingError> {
        self.value(field)
            .map(|v| v.as_str().map(String::from).ok_or_else(|| self.invalid(field, "a string")))
            .transpose()
    }

    /// Identifiers may arrive as strings or integers; both become strings.
    pub fn id(&self, field: &'static str) -> Result<Option<String>, MappingError> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(self.invalid(field, "a string or integer id")),
        }
    }

    pub fn bool(&self, field: &'static str) -> Result<bool, MappingError> {
        self.required(field)?
            .as_bool()
            .ok_or_else(|| self.invalid(field, "a boolean"))
    }

    pub fn u32(&self, field: &'static str) -> Result<u32, MappingError> {
        self.required(field)?
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| self.invalid(field, "a non-negative integer"))
    }

    pub fn opt_u32(&self, field: &'static str) -> Result<Option<u32>, MappingError> {
        self.value(field)
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| self.invalid(field, "a non-negative integer"))
            })
            .transpose()
    }

    pub fn opt_u8(&self, field: &'static str) -> Result<Option<u8>, MappingError> {
        self.value(field)
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| self.invalid(field, "a small non-negative integer"))
            })
            .transpose()
    }

    pub fn timestamp(&self, field: &'static str) -> Result<DateTime<Utc>, MappingError> {
        match self.required(field)? {
            Value::String(s) => parse_timestamp(s).ok_or_else(|| self.invalid(field, "a timestamp")),
            Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .ok_or_else(|| self.invalid(field, "a timestamp")),
            _ => Err(self.invalid(field, "a timestamp")),
        }
    }

    pub fn array(&self, field: &'static str) -> Result<&'a Vec<Value>, MappingError> {
        self.required(field)?
            .as_array()
            .ok_or_else(|| self.invalid(field, "an array"))
    }
}

/// Map every row, failing on the first malformed one.
pub fn rows_to<T: RowMapping>(rows: &[Row]) -> Result<Vec<T>, MappingError> {
    rows.iter().map(T::from_row).collect()
}
