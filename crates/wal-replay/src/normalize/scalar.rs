//! Declared-type coercion for non-JSON columns.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core::{ColumnValue, DeclaredType, SqlNullType, SqlValue};

/// NULL type hint for a declared type.
pub(crate) fn null_type_for(declared: DeclaredType) -> SqlNullType {
    match declared {
        DeclaredType::Boolean => SqlNullType::Bool,
        DeclaredType::SmallInt => SqlNullType::I16,
        DeclaredType::Integer => SqlNullType::I32,
        DeclaredType::BigInt => SqlNullType::I64,
        DeclaredType::Real => SqlNullType::F32,
        DeclaredType::Double => SqlNullType::F64,
        DeclaredType::Numeric => SqlNullType::Decimal,
        DeclaredType::Bytea => SqlNullType::Bytes,
        DeclaredType::Uuid => SqlNullType::Uuid,
        DeclaredType::Date => SqlNullType::Date,
        DeclaredType::Time => SqlNullType::Time,
        DeclaredType::Timestamp => SqlNullType::DateTime,
        DeclaredType::TimestampTz => SqlNullType::DateTimeOffset,
        DeclaredType::Json(kind) => SqlNullType::Json(kind),
        DeclaredType::Text | DeclaredType::Unrecognized => SqlNullType::String,
    }
}

/// Coerce a scalar value to the native form of its declared type.
///
/// Returns a reason string on failure; the caller attaches column context.
pub(crate) fn coerce(declared: DeclaredType, value: &ColumnValue) -> Result<SqlValue<'_>, String> {
    if let ColumnValue::Null = value {
        return Ok(SqlValue::Null(null_type_for(declared)));
    }

    match declared {
        DeclaredType::Boolean => coerce_bool(value),
        DeclaredType::SmallInt => coerce_int(value).and_then(|i| {
            i16::try_from(i)
                .map(SqlValue::I16)
                .map_err(|_| format!("{} is out of range for smallint", i))
        }),
        DeclaredType::Integer => coerce_int(value).and_then(|i| {
            i32::try_from(i)
                .map(SqlValue::I32)
                .map_err(|_| format!("{} is out of range for integer", i))
        }),
        DeclaredType::BigInt => coerce_int(value).map(SqlValue::I64),
        DeclaredType::Real => coerce_float(value).map(|f| SqlValue::F32(f as f32)),
        DeclaredType::Double => coerce_float(value).map(SqlValue::F64),
        DeclaredType::Numeric => coerce_decimal(value).map(SqlValue::Decimal),
        DeclaredType::Text => coerce_text(value),
        DeclaredType::Bytea => coerce_bytes(value),
        DeclaredType::Uuid => coerce_uuid(value),
        DeclaredType::Date => expect_text(value, "date").and_then(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(SqlValue::Date)
                .map_err(|e| format!("invalid date '{}': {}", s, e))
        }),
        DeclaredType::Time => expect_text(value, "time").and_then(|s| {
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .map(SqlValue::Time)
                .map_err(|e| format!("invalid time '{}': {}", s, e))
        }),
        DeclaredType::Timestamp => expect_text(value, "timestamp").and_then(|s| {
            parse_timestamp(s)
                .map(SqlValue::DateTime)
                .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
        }),
        DeclaredType::TimestampTz => expect_text(value, "timestamptz").and_then(|s| {
            parse_timestamptz(s)
                .map(SqlValue::DateTimeOffset)
                .map_err(|e| format!("invalid timestamptz '{}': {}", s, e))
        }),
        DeclaredType::Json(_) | DeclaredType::Unrecognized => {
            Err("no scalar coercion for this type".to_string())
        }
    }
}

/// Forward a value of an unrecognized type in its nearest canonical form.
///
/// Decoded JSON is not handled here; the normalizer encodes it.
pub(crate) fn pass_through(value: &ColumnValue) -> Option<SqlValue<'_>> {
    use crate::core::EncodedPayload;

    Some(match value {
        ColumnValue::Null => SqlValue::Null(SqlNullType::String),
        ColumnValue::Bool(b) => SqlValue::Bool(*b),
        ColumnValue::Int(i) => SqlValue::I64(*i),
        ColumnValue::Float(f) => SqlValue::F64(*f),
        ColumnValue::Text(s) => SqlValue::Text(Cow::Borrowed(s)),
        ColumnValue::Bytes(b) => SqlValue::Bytes(Cow::Borrowed(b)),
        ColumnValue::Encoded(EncodedPayload::Bytes(b)) => SqlValue::Bytes(Cow::Borrowed(b)),
        ColumnValue::Encoded(EncodedPayload::Text(s)) => SqlValue::Text(Cow::Borrowed(s)),
        ColumnValue::Json(_) => return None,
    })
}

fn mismatch(expected: &str, value: &ColumnValue) -> String {
    format!("expected {}, got {} value", expected, value.kind_name())
}

fn expect_text<'a>(value: &'a ColumnValue, expected: &str) -> Result<&'a str, String> {
    match value {
        ColumnValue::Text(s) => Ok(s.trim()),
        other => Err(mismatch(expected, other)),
    }
}

fn coerce_bool(value: &ColumnValue) -> Result<SqlValue<'static>, String> {
    match value {
        ColumnValue::Bool(b) => Ok(SqlValue::Bool(*b)),
        ColumnValue::Int(0) => Ok(SqlValue::Bool(false)),
        ColumnValue::Int(1) => Ok(SqlValue::Bool(true)),
        ColumnValue::Text(s) => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "on" => Ok(SqlValue::Bool(true)),
            "f" | "false" | "0" | "no" | "off" => Ok(SqlValue::Bool(false)),
            other => Err(format!("invalid boolean '{}'", other)),
        },
        other => Err(mismatch("boolean", other)),
    }
}

fn coerce_int(value: &ColumnValue) -> Result<i64, String> {
    match value {
        ColumnValue::Int(i) => Ok(*i),
        ColumnValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid integer '{}': {}", s, e)),
        other => Err(mismatch("integer", other)),
    }
}

fn coerce_float(value: &ColumnValue) -> Result<f64, String> {
    match value {
        ColumnValue::Float(f) => Ok(*f),
        ColumnValue::Int(i) => Ok(*i as f64),
        ColumnValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid float '{}': {}", s, e)),
        other => Err(mismatch("float", other)),
    }
}

fn coerce_decimal(value: &ColumnValue) -> Result<Decimal, String> {
    match value {
        ColumnValue::Int(i) => Ok(Decimal::from(*i)),
        ColumnValue::Float(f) => {
            Decimal::try_from(*f).map_err(|e| format!("invalid numeric {}: {}", f, e))
        }
        ColumnValue::Text(s) => {
            let cleaned = s.trim().replace(['$', ','], "");
            Decimal::from_str_exact(&cleaned)
                .or_else(|_| cleaned.parse::<Decimal>())
                .or_else(|_| Decimal::from_scientific(&cleaned))
                .map_err(|e| format!("invalid numeric '{}': {}", s, e))
        }
        other => Err(mismatch("numeric", other)),
    }
}

fn coerce_text(value: &ColumnValue) -> Result<SqlValue<'_>, String> {
    use crate::core::EncodedPayload;

    match value {
        ColumnValue::Text(s) | ColumnValue::Encoded(EncodedPayload::Text(s)) => {
            Ok(SqlValue::Text(Cow::Borrowed(s)))
        }
        ColumnValue::Bool(b) => Ok(SqlValue::text_owned(b.to_string())),
        ColumnValue::Int(i) => Ok(SqlValue::text_owned(i.to_string())),
        ColumnValue::Float(f) => Ok(SqlValue::text_owned(f.to_string())),
        other => Err(mismatch("text", other)),
    }
}

fn coerce_bytes(value: &ColumnValue) -> Result<SqlValue<'_>, String> {
    match value {
        ColumnValue::Bytes(b) => Ok(SqlValue::Bytes(Cow::Borrowed(b))),
        ColumnValue::Encoded(p) => Ok(SqlValue::Bytes(Cow::Borrowed(p.as_bytes()))),
        ColumnValue::Text(s) => match s.strip_prefix("\\x") {
            // PostgreSQL bytea in hex format: \x followed by hex digits
            Some(hex_str) => hex::decode(hex_str)
                .map(SqlValue::bytes_owned)
                .map_err(|e| format!("invalid bytea hex: {}", e)),
            None => Ok(SqlValue::Bytes(Cow::Borrowed(s.as_bytes()))),
        },
        other => Err(mismatch("bytea", other)),
    }
}

fn coerce_uuid(value: &ColumnValue) -> Result<SqlValue<'static>, String> {
    match value {
        ColumnValue::Text(s) => Uuid::parse_str(s.trim())
            .map(SqlValue::Uuid)
            .map_err(|e| format!("invalid uuid '{}': {}", s, e)),
        ColumnValue::Bytes(b) => Uuid::from_slice(b)
            .map(SqlValue::Uuid)
            .map_err(|e| format!("invalid uuid bytes: {}", e)),
        other => Err(mismatch("uuid", other)),
    }
}

fn parse_timestamp(s: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
}

fn parse_timestamptz(s: &str) -> chrono::ParseResult<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%#z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn text(s: &str) -> ColumnValue {
        ColumnValue::Text(s.to_string())
    }

    #[test]
    fn test_null_carries_type_hint() {
        assert_eq!(
            coerce(DeclaredType::Integer, &ColumnValue::Null).unwrap(),
            SqlValue::Null(SqlNullType::I32)
        );
        assert_eq!(
            coerce(DeclaredType::TimestampTz, &ColumnValue::Null).unwrap(),
            SqlValue::Null(SqlNullType::DateTimeOffset)
        );
    }

    #[test]
    fn test_integer_narrowing_is_checked() {
        assert_eq!(
            coerce(DeclaredType::SmallInt, &ColumnValue::Int(12)).unwrap(),
            SqlValue::I16(12)
        );
        let err = coerce(DeclaredType::SmallInt, &ColumnValue::Int(70_000)).unwrap_err();
        assert!(err.contains("out of range"));
        assert_eq!(
            coerce(DeclaredType::BigInt, &text(" 42 ")).unwrap(),
            SqlValue::I64(42)
        );
        assert!(coerce(DeclaredType::Integer, &ColumnValue::Float(1.5)).is_err());
    }

    #[test]
    fn test_float_widening() {
        assert_eq!(
            coerce(DeclaredType::Double, &ColumnValue::Int(3)).unwrap(),
            SqlValue::F64(3.0)
        );
        match coerce(DeclaredType::Double, &text("NaN")).unwrap() {
            SqlValue::F64(f) => assert!(f.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            coerce(DeclaredType::Real, &text("-Infinity")).unwrap(),
            SqlValue::F32(f32::NEG_INFINITY)
        );
    }

    #[test]
    fn test_boolean_forms() {
        assert_eq!(
            coerce(DeclaredType::Boolean, &text("t")).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            coerce(DeclaredType::Boolean, &text("OFF")).unwrap(),
            SqlValue::Bool(false)
        );
        assert!(coerce(DeclaredType::Boolean, &text("maybe")).is_err());
    }

    #[test]
    fn test_numeric_from_text_and_float() {
        assert_eq!(
            coerce(DeclaredType::Numeric, &text("$1,234.50")).unwrap(),
            SqlValue::Decimal("1234.50".parse().unwrap())
        );
        assert_eq!(
            coerce(DeclaredType::Numeric, &ColumnValue::Int(-7)).unwrap(),
            SqlValue::Decimal(Decimal::from(-7))
        );
        assert!(coerce(DeclaredType::Numeric, &ColumnValue::Float(0.25)).is_ok());
        assert!(coerce(DeclaredType::Numeric, &text("NaN")).is_err());
    }

    #[test]
    fn test_text_is_borrowed() {
        let value = text("hello");
        let out = coerce(DeclaredType::Text, &value).unwrap();
        assert!(out.is_borrowed());
        assert_eq!(
            coerce(DeclaredType::Text, &ColumnValue::Int(5)).unwrap(),
            SqlValue::text_owned("5".into())
        );
    }

    #[test]
    fn test_bytea_hex_and_passthrough() {
        assert_eq!(
            coerce(DeclaredType::Bytea, &text("\\xdeadbeef")).unwrap(),
            SqlValue::bytes_owned(vec![0xde, 0xad, 0xbe, 0xef])
        );
        let raw = ColumnValue::Bytes(vec![1, 2, 3]);
        let out = coerce(DeclaredType::Bytea, &raw).unwrap();
        assert!(out.is_borrowed());
        assert!(coerce(DeclaredType::Bytea, &text("\\xzz")).is_err());
    }

    #[test]
    fn test_uuid() {
        let value = text("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11");
        let out = coerce(DeclaredType::Uuid, &value).unwrap();
        assert!(matches!(out, SqlValue::Uuid(_)));
        assert!(coerce(DeclaredType::Uuid, &ColumnValue::Bytes(vec![0; 3])).is_err());
    }

    #[test]
    fn test_temporal_parsing() {
        match coerce(DeclaredType::Timestamp, &text("2024-03-01 12:30:45.123456")).unwrap() {
            SqlValue::DateTime(dt) => {
                assert_eq!(dt.year(), 2024);
                assert_eq!(dt.nanosecond(), 123_456_000);
            }
            other => panic!("unexpected {:?}", other),
        }
        match coerce(DeclaredType::TimestampTz, &text("2024-03-01 12:30:45+02")).unwrap() {
            SqlValue::DateTimeOffset(dt) => {
                assert_eq!(dt.offset().local_minus_utc(), 7200);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            coerce(DeclaredType::TimestampTz, &text("2024-03-01T12:30:45Z")).unwrap(),
            SqlValue::DateTimeOffset(_)
        ));
        assert!(matches!(
            coerce(DeclaredType::Date, &text("2024-02-29")).unwrap(),
            SqlValue::Date(_)
        ));
        assert!(matches!(
            coerce(DeclaredType::Time, &text("23:59:59")).unwrap(),
            SqlValue::Time(_)
        ));
        assert!(coerce(DeclaredType::Date, &ColumnValue::Int(1)).is_err());
    }

    #[test]
    fn test_pass_through_nearest_form() {
        assert_eq!(pass_through(&ColumnValue::Int(9)), Some(SqlValue::I64(9)));
        assert!(pass_through(&ColumnValue::Json(serde_json::json!([1]))).is_none());
        let v = text("x");
        assert!(pass_through(&v).unwrap().is_borrowed());
    }
}
