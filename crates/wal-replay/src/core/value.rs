//! Canonical SQL value types produced by the normalizer.
//!
//! These are the values handed to the storage layer, either bound as statement
//! parameters or encoded into a COPY stream.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Column type carried by a NULL, so binary COPY and parameter binding know
/// which wire type the NULL stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
    Json(JsonKind),
}

/// Which JSON-family column type a JSON payload is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonKind {
    Json,
    Jsonb,
    JsonArray,
    JsonbArray,
}

impl JsonKind {
    /// Whether the target column is an array of JSON documents.
    pub fn is_array(self) -> bool {
        matches!(self, JsonKind::JsonArray | JsonKind::JsonbArray)
    }
}

/// One normalized column value, ready for a statement parameter or a COPY
/// field.
///
/// Text, bytea and pre-serialized JSON keep borrowing the change column they
/// came from; only coerced or freshly encoded values own their data.
///
/// ```rust
/// use std::borrow::Cow;
/// use wal_replay::core::{JsonKind, SqlValue};
///
/// let payload = br#"{"a":1}"#.to_vec();
/// let value = SqlValue::Json(JsonKind::Jsonb, Cow::Borrowed(payload.as_slice()));
/// assert!(value.is_borrowed());
/// assert_eq!(value.into_owned().as_json_bytes(), Some(&br#"{"a":1}"#[..]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    Null(SqlNullType),
    Bool(bool),
    /// `smallint`
    I16(i16),
    /// `integer`
    I32(i32),
    /// `bigint`, and integers under an unrecognized type.
    I64(i64),
    /// `real`
    F32(f32),
    /// `double precision`
    F64(f64),
    Text(Cow<'a, str>),
    /// `bytea`
    Bytes(Cow<'a, [u8]>),
    Uuid(Uuid),
    /// `numeric`, `decimal` and `money`.
    Decimal(Decimal),
    /// `timestamp`
    DateTime(NaiveDateTime),
    /// `timestamptz`, kept at the offset it was written with.
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),

    /// JSON text, either forwarded untouched from a pre-serialized payload
    /// or produced by exactly one pass of the canonical encoder.
    Json(JsonKind, Cow<'a, [u8]>),
}

impl<'a> SqlValue<'a> {
    /// Detach from the change column, copying any borrowed payload.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null(t) => SqlValue::Null(t),
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I16(v) => SqlValue::I16(v),
            SqlValue::I32(v) => SqlValue::I32(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::F32(v) => SqlValue::F32(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            SqlValue::Uuid(v) => SqlValue::Uuid(v),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::DateTimeOffset(v) => SqlValue::DateTimeOffset(v),
            SqlValue::Date(v) => SqlValue::Date(v),
            SqlValue::Time(v) => SqlValue::Time(v),
            SqlValue::Json(k, v) => SqlValue::Json(k, Cow::Owned(v.into_owned())),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Wire type of this value; for NULL, the type it was declared with.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::Text(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
            SqlValue::Json(k, _) => SqlNullType::Json(*k),
        }
    }

    /// The JSON text of a JSON-family value.
    #[must_use]
    pub fn as_json_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Json(_, v) => Some(v.as_ref()),
            _ => None,
        }
    }

    /// Whether the value still borrows from the change column it came from.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        match self {
            SqlValue::Text(v) => matches!(v, Cow::Borrowed(_)),
            SqlValue::Bytes(v) | SqlValue::Json(_, v) => matches!(v, Cow::Borrowed(_)),
            _ => false,
        }
    }
}

impl SqlValue<'_> {
    /// Text produced by coercion rather than borrowed.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }

    /// Bytes decoded from a `\x` hex literal.
    #[must_use]
    pub fn bytes_owned(b: Vec<u8>) -> SqlValue<'static> {
        SqlValue::Bytes(Cow::Owned(b))
    }

    /// JSON text produced by the canonical encoder.
    #[must_use]
    pub fn json_owned(kind: JsonKind, b: Vec<u8>) -> SqlValue<'static> {
        SqlValue::Json(kind, Cow::Owned(b))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_detaches_from_column() {
        let column_text = String::from("hello");
        let borrowed = SqlValue::from(column_text.as_str());
        assert!(borrowed.is_borrowed());
        let owned: SqlValue<'static> = borrowed.into_owned();
        drop(column_text);
        assert!(!owned.is_borrowed());
        assert_eq!(owned, SqlValue::text_owned("hello".to_string()));
    }

    #[test]
    fn test_json_into_owned_keeps_bytes() {
        let payload = br#"{"a":1}"#.to_vec();
        let v = SqlValue::Json(JsonKind::Jsonb, Cow::Borrowed(payload.as_slice()));
        let owned = v.into_owned();
        assert_eq!(owned.as_json_bytes(), Some(payload.as_slice()));
        assert_eq!(owned.null_type(), SqlNullType::Json(JsonKind::Jsonb));
    }

    #[test]
    fn test_null_keeps_declared_type() {
        let null = SqlValue::Null(SqlNullType::Json(JsonKind::JsonbArray));
        assert!(null.is_null());
        assert_eq!(null.null_type(), SqlNullType::Json(JsonKind::JsonbArray));
        assert!(!SqlValue::I32(42).is_null());
        assert_eq!(SqlValue::I32(42).null_type(), SqlNullType::I32);
    }

    #[test]
    fn test_json_kind_is_array() {
        assert!(JsonKind::JsonbArray.is_array());
        assert!(JsonKind::JsonArray.is_array());
        assert!(!JsonKind::Jsonb.is_array());
    }
}
