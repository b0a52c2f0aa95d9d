//! Value normalization.
//!
//! Maps one change column, given its declared type, to exactly one canonical
//! [`SqlValue`]. The decision between "forward as-is" and "encode" for
//! JSON-family columns is made from the representation kind the decoder
//! attached to the value, never from the payload contents:
//!
//! | value kind                  | JSON-family result                    |
//! |-----------------------------|---------------------------------------|
//! | `Null`                      | SQL NULL                              |
//! | `Encoded`/`Text`/`Bytes`    | payload bytes, unchanged and borrowed |
//! | `Json`/`Bool`/`Int`/`Float` | one pass of the canonical encoder     |
//!
//! Normalization is pure: no I/O, no shared mutable state, no memory of
//! previous calls.

mod json;
mod scalar;

pub use json::{canonical_encoder, JsonEncoder, SerdeJsonEncoder};

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;

use crate::core::{ChangeColumn, ColumnValue, DeclaredType, JsonKind, SqlNullType, SqlValue};
use crate::error::{ReplayError, Result};

/// Non-fatal diagnostic raised while normalizing a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeWarning {
    /// No rule exists for the declared type; the value was forwarded as-is.
    UnrecognizedType {
        column: String,
        declared_type: String,
    },
}

impl std::fmt::Display for NormalizeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeWarning::UnrecognizedType {
                column,
                declared_type,
            } => write!(
                f,
                "column {} has unrecognized type '{}', value passed through",
                column, declared_type
            ),
        }
    }
}

/// Output of a single normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<'a> {
    pub value: SqlValue<'a>,
    pub warning: Option<NormalizeWarning>,
}

impl<'a> Normalized<'a> {
    fn clean(value: SqlValue<'a>) -> Self {
        Self {
            value,
            warning: None,
        }
    }
}

/// Maps `(declared type, value)` to a canonical value.
///
/// Cheap to clone; clones share the same encoder instance.
#[derive(Debug, Clone)]
pub struct ValueNormalizer {
    encoder: Arc<dyn JsonEncoder>,
    strict_types: bool,
}

impl Default for ValueNormalizer {
    fn default() -> Self {
        Self::new(canonical_encoder())
    }
}

impl ValueNormalizer {
    pub fn new(encoder: Arc<dyn JsonEncoder>) -> Self {
        Self {
            encoder,
            strict_types: false,
        }
    }

    /// Fail on unrecognized declared types instead of passing them through.
    pub fn with_strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    /// The encoder used for decoded JSON values.
    pub fn encoder(&self) -> &Arc<dyn JsonEncoder> {
        &self.encoder
    }

    /// Normalize one column of a change event on `table`.
    ///
    /// `table` is only used for error context.
    pub fn normalize<'a>(&self, table: &str, column: &'a ChangeColumn) -> Result<Normalized<'a>> {
        match column.declared() {
            DeclaredType::Json(kind) => self
                .normalize_json(table, column, kind)
                .map(Normalized::clean),
            DeclaredType::Unrecognized => self.normalize_unrecognized(table, column),
            declared => scalar::coerce(declared, &column.value)
                .map(Normalized::clean)
                .map_err(|message| ReplayError::InvalidValue {
                    table: table.to_string(),
                    column: column.name.clone(),
                    declared_type: column.declared_type.clone(),
                    message,
                }),
        }
    }

    fn normalize_json<'a>(
        &self,
        table: &str,
        column: &'a ChangeColumn,
        kind: JsonKind,
    ) -> Result<SqlValue<'a>> {
        let decoded: Cow<'a, Value> = match &column.value {
            ColumnValue::Null => return Ok(SqlValue::Null(SqlNullType::Json(kind))),
            // Strings and raw bytes under a JSON type are already JSON text.
            ColumnValue::Encoded(payload) => {
                return Ok(SqlValue::Json(kind, Cow::Borrowed(payload.as_bytes())))
            }
            ColumnValue::Text(s) => return Ok(SqlValue::Json(kind, Cow::Borrowed(s.as_bytes()))),
            ColumnValue::Bytes(b) => return Ok(SqlValue::Json(kind, Cow::Borrowed(b.as_slice()))),
            ColumnValue::Json(v) => Cow::Borrowed(v),
            ColumnValue::Bool(b) => Cow::Owned(Value::Bool(*b)),
            ColumnValue::Int(i) => Cow::Owned(Value::from(*i)),
            ColumnValue::Float(f) => match serde_json::Number::from_f64(*f) {
                Some(n) => Cow::Owned(Value::Number(n)),
                None => {
                    return Err(encoding_failure(
                        table,
                        column,
                        format!("{} has no JSON representation", f),
                    ))
                }
            },
        };

        if kind.is_array() && !decoded.is_array() {
            return Err(encoding_failure(
                table,
                column,
                "array column requires a JSON sequence",
            ));
        }

        self.encode_once(table, column, kind, &decoded)
    }

    fn normalize_unrecognized<'a>(
        &self,
        table: &str,
        column: &'a ChangeColumn,
    ) -> Result<Normalized<'a>> {
        if self.strict_types {
            return Err(ReplayError::UnrecognizedType {
                table: table.to_string(),
                column: column.name.clone(),
                declared_type: column.declared_type.clone(),
            });
        }

        let value = match &column.value {
            ColumnValue::Json(v) => self.encode_once(table, column, JsonKind::Json, v)?,
            other => scalar::pass_through(other).ok_or_else(|| {
                encoding_failure(table, column, "decoded JSON cannot pass through")
            })?,
        };

        Ok(Normalized {
            value,
            warning: Some(NormalizeWarning::UnrecognizedType {
                column: column.name.clone(),
                declared_type: column.declared_type.clone(),
            }),
        })
    }

    /// The only place decoded JSON becomes JSON text.
    fn encode_once(
        &self,
        table: &str,
        column: &ChangeColumn,
        kind: JsonKind,
        value: &Value,
    ) -> Result<SqlValue<'static>> {
        self.encoder
            .encode(value)
            .map(|bytes| SqlValue::json_owned(kind, bytes))
            .map_err(|message| encoding_failure(table, column, message))
    }
}

fn encoding_failure(table: &str, column: &ChangeColumn, message: impl Into<String>) -> ReplayError {
    ReplayError::EncodingFailure {
        table: table.to_string(),
        column: column.name.clone(),
        declared_type: column.declared_type.clone(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EncodedPayload;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encoder that counts how often it is called.
    #[derive(Debug, Default)]
    struct CountingEncoder {
        calls: AtomicUsize,
    }

    impl JsonEncoder for CountingEncoder {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn encode(&self, value: &Value) -> std::result::Result<Vec<u8>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SerdeJsonEncoder.encode(value)
        }
    }

    #[derive(Debug)]
    struct FailingEncoder;

    impl JsonEncoder for FailingEncoder {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn encode(&self, _value: &Value) -> std::result::Result<Vec<u8>, String> {
            Err("encoder refused value".to_string())
        }
    }

    fn jsonb(name: &str, value: ColumnValue) -> ChangeColumn {
        ChangeColumn::new(name, "jsonb", value)
    }

    #[test]
    fn test_decoded_structure_with_unicode_round_trips() {
        let original = json!({
            "name": "David Richard 🏳️‍🌈",
            "location": "São Paulo",
            "quote": "said \"hello\""
        });
        let col = jsonb("data", ColumnValue::Json(original.clone()));

        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        let bytes = out.value.as_json_bytes().unwrap();
        let decoded: Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(decoded, original);
        assert!(out.warning.is_none());
    }

    #[test]
    fn test_scenario_a_flag_emoji() {
        let col = jsonb("data", ColumnValue::Json(json!({"name": "A üè³Ô∏è‍🌈"})));
        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        let decoded: Value = serde_json::from_slice(out.value.as_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded, json!({"name": "A üè³Ô∏è‍🌈"}));
    }

    #[test]
    fn test_pre_serialized_string_not_double_encoded() {
        let original = r#"{"tables":[{"name":"users"}]}"#;
        let col = jsonb(
            "schema",
            ColumnValue::Encoded(EncodedPayload::Text(original.to_string())),
        );

        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        assert_eq!(out.value.as_json_bytes().unwrap(), original.as_bytes());
        assert!(out.value.is_borrowed());

        let decoded: Value = serde_json::from_slice(out.value.as_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded, json!({"tables": [{"name": "users"}]}));
        assert!(!decoded.is_string());
    }

    #[test]
    fn test_pre_serialized_bytes_are_byte_identical() {
        // Non-canonical spacing and escaped unicode from some other encoder.
        let payload = b"{ \"k\" : \"\\u00e9\" ,\"n\":1.0 }".to_vec();
        let col = jsonb("data", ColumnValue::Encoded(EncodedPayload::Bytes(payload.clone())));
        let counting = Arc::new(CountingEncoder::default());
        let normalizer = ValueNormalizer::new(counting.clone());

        let out = normalizer.normalize("public.t", &col).unwrap();
        assert_eq!(out.value.as_json_bytes().unwrap(), payload.as_slice());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_json_scalar_string_encoded_once() {
        // A JSON value that is itself the string "5".
        let col = jsonb("v", ColumnValue::Json(json!("5")));
        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        assert_eq!(out.value.as_json_bytes().unwrap(), b"\"5\"");
    }

    #[test]
    fn test_single_encoding_and_idempotent_renormalize() {
        let counting = Arc::new(CountingEncoder::default());
        let normalizer = ValueNormalizer::new(counting.clone());
        let col = jsonb("data", ColumnValue::Json(json!({"a": [1, 2, {"b": null}]})));

        let first = normalizer.normalize("public.t", &col).unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        let first_bytes = first.value.as_json_bytes().unwrap().to_vec();
        assert_eq!(
            first_bytes,
            SerdeJsonEncoder.encode(&json!({"a": [1, 2, {"b": null}]})).unwrap()
        );

        // Feed the output back as a pre-serialized payload.
        let again = jsonb(
            "data",
            ColumnValue::Encoded(EncodedPayload::Bytes(first_bytes.clone())),
        );
        let second = normalizer.normalize("public.t", &again).unwrap();
        assert_eq!(second.value.as_json_bytes().unwrap(), first_bytes.as_slice());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_null_is_sql_null() {
        let col = jsonb("data", ColumnValue::Null);
        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        assert_eq!(out.value, SqlValue::Null(SqlNullType::Json(JsonKind::Jsonb)));

        // JSON null inside a decoded value is a JSON document, not SQL NULL.
        let col = jsonb("data", ColumnValue::Json(Value::Null));
        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        assert_eq!(out.value.as_json_bytes().unwrap(), b"null");
    }

    #[test]
    fn test_plain_text_payload_passes_through() {
        let original = r#"{"tables":[{"name":"users"}]}"#;
        let counting = Arc::new(CountingEncoder::default());
        let normalizer = ValueNormalizer::new(counting.clone());
        let col = jsonb("schema", ColumnValue::Text(original.to_string()));

        let out = normalizer.normalize("public.t", &col).unwrap();
        assert_eq!(out.value.as_json_bytes().unwrap(), original.as_bytes());
        assert!(out.value.is_borrowed());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);

        let decoded: Value = serde_json::from_slice(out.value.as_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded, json!({"tables": [{"name": "users"}]}));
    }

    #[test]
    fn test_raw_bytes_payload_passes_through() {
        let payload = br#"{"id":7,"tags":["a"]}"#.to_vec();
        let col = jsonb("data", ColumnValue::Bytes(payload.clone()));

        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        assert_eq!(out.value.as_json_bytes().unwrap(), payload.as_slice());
        assert!(out.value.is_borrowed());
    }

    #[test]
    fn test_scenario_d_unsupported_shape() {
        let col = ChangeColumn::new("tags", "jsonb[]", ColumnValue::Int(3));
        let err = ValueNormalizer::default()
            .normalize("public.t", &col)
            .unwrap_err();
        assert!(matches!(err, ReplayError::EncodingFailure { .. }));
        assert_eq!(err.column(), Some("tags"));

        let col = jsonb("ratio", ColumnValue::Float(f64::NAN));
        let err = ValueNormalizer::default()
            .normalize("public.t", &col)
            .unwrap_err();
        assert!(matches!(err, ReplayError::EncodingFailure { ref column, .. } if column == "ratio"));
    }

    #[test]
    fn test_encoder_failure_is_reported() {
        let normalizer = ValueNormalizer::new(Arc::new(FailingEncoder));
        let col = jsonb("data", ColumnValue::Json(json!({"a": 1})));
        let err = normalizer.normalize("public.t", &col).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Encoding failed for public.t.data (jsonb): encoder refused value"
        );
    }

    #[test]
    fn test_array_form_requires_sequence() {
        let normalizer = ValueNormalizer::default();
        let ok = ChangeColumn::new("tags", "jsonb[]", ColumnValue::Json(json!([{"a": 1}, 2])));
        let out = normalizer.normalize("public.t", &ok).unwrap();
        assert_eq!(out.value.null_type(), SqlNullType::Json(JsonKind::JsonbArray));

        let bad = ChangeColumn::new("tags", "jsonb[]", ColumnValue::Json(json!({"a": 1})));
        assert!(matches!(
            normalizer.normalize("public.t", &bad),
            Err(ReplayError::EncodingFailure { .. })
        ));
    }

    #[test]
    fn test_scalar_types_use_coercion() {
        let normalizer = ValueNormalizer::default();
        let col = ChangeColumn::new("id", "integer", ColumnValue::Int(1));
        assert_eq!(
            normalizer.normalize("public.t", &col).unwrap().value,
            SqlValue::I32(1)
        );

        let col = ChangeColumn::new("id", "integer", ColumnValue::Text("x".into()));
        let err = normalizer.normalize("public.t", &col).unwrap_err();
        assert!(matches!(err, ReplayError::InvalidValue { .. }));
    }

    #[test]
    fn test_unrecognized_type_passes_through_with_warning() {
        let col = ChangeColumn::new("loc", "point", ColumnValue::Text("(1,2)".into()));
        let out = ValueNormalizer::default().normalize("public.t", &col).unwrap();
        assert_eq!(out.value, SqlValue::Text(Cow::Borrowed("(1,2)")));
        assert_eq!(
            out.warning,
            Some(NormalizeWarning::UnrecognizedType {
                column: "loc".into(),
                declared_type: "point".into(),
            })
        );
    }

    #[test]
    fn test_unrecognized_type_strict_mode_fails() {
        let col = ChangeColumn::new("loc", "point", ColumnValue::Text("(1,2)".into()));
        let err = ValueNormalizer::default()
            .with_strict_types(true)
            .normalize("public.t", &col)
            .unwrap_err();
        assert!(matches!(err, ReplayError::UnrecognizedType { .. }));
    }

    #[test]
    fn test_deterministic_across_threads() {
        let normalizer = ValueNormalizer::default();
        let col = jsonb("data", ColumnValue::Json(json!({"x": [1, "two", 3.5]})));
        let expected = normalizer.normalize("public.t", &col).unwrap().value.into_owned();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let n = normalizer.clone();
                let c = col.clone();
                std::thread::spawn(move || n.normalize("public.t", &c).unwrap().value.into_owned())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    }
}
