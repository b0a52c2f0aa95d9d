//! Change events and columns as handed over by the WAL decoder.
//!
//! The decoder decides the representation kind of every value: a JSON
//! payload it has already serialized arrives as [`ColumnValue::Encoded`],
//! a structure it has decoded arrives as [`ColumnValue::Json`]. Nothing in
//! this crate inspects payload contents to change that decision.

use std::path::Path;

use serde::Deserialize;

use super::value::JsonKind;
use crate::error::{ReplayError, Result};

/// Pre-serialized payload passed through from an earlier pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedPayload {
    Bytes(Vec<u8>),
    Text(String),
}

impl EncodedPayload {
    /// The payload bytes exactly as received.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EncodedPayload::Bytes(b) => b,
            EncodedPayload::Text(s) => s.as_bytes(),
        }
    }
}

/// Dynamically-typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Absent or SQL NULL.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Decoded JSON: a mapping, a sequence, or a bare scalar parsed out of JSON.
    Json(serde_json::Value),
    /// JSON text serialized upstream; forwarded byte-for-byte.
    Encoded(EncodedPayload),
}

impl ColumnValue {
    /// Map a decoded JSON scalar onto the scalar variants.
    ///
    /// Arrays and objects stay decoded structures.
    pub fn from_json_scalar(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ColumnValue::Null,
            Value::Bool(b) => ColumnValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ColumnValue::Int(i),
                None => n
                    .as_f64()
                    .map(ColumnValue::Float)
                    .unwrap_or(ColumnValue::Json(Value::Number(n))),
            },
            Value::String(s) => ColumnValue::Text(s),
            other => ColumnValue::Json(other),
        }
    }

    /// Short name of the representation kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnValue::Null => "null",
            ColumnValue::Bool(_) => "bool",
            ColumnValue::Int(_) => "int",
            ColumnValue::Float(_) => "float",
            ColumnValue::Text(_) => "text",
            ColumnValue::Bytes(_) => "bytes",
            ColumnValue::Json(_) => "json",
            ColumnValue::Encoded(_) => "encoded",
        }
    }
}

/// Semantic type tag carried by the decoder, with modifiers stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Bytea,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json(JsonKind),
    Unrecognized,
}

impl DeclaredType {
    /// Parse a PostgreSQL type name such as `character varying(255)`,
    /// `timestamp(6) with time zone` or `jsonb[]`.
    pub fn parse(tag: &str) -> Self {
        let base = strip_modifiers(&tag.to_lowercase());
        let (base, is_array) = if let Some(b) = base.strip_suffix("[]") {
            (b.trim_end().to_string(), true)
        } else if let Some(b) = base.strip_prefix('_') {
            (b.to_string(), true)
        } else {
            (base, false)
        };

        if is_array {
            return match base.as_str() {
                "json" => DeclaredType::Json(JsonKind::JsonArray),
                "jsonb" => DeclaredType::Json(JsonKind::JsonbArray),
                _ => DeclaredType::Unrecognized,
            };
        }

        match base.as_str() {
            "bool" | "boolean" => DeclaredType::Boolean,
            "int2" | "smallint" | "smallserial" => DeclaredType::SmallInt,
            "int" | "int4" | "integer" | "serial" => DeclaredType::Integer,
            "int8" | "bigint" | "bigserial" => DeclaredType::BigInt,
            "float4" | "real" => DeclaredType::Real,
            "float8" | "double precision" | "float" => DeclaredType::Double,
            "numeric" | "decimal" | "money" => DeclaredType::Numeric,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "name" | "citext" => DeclaredType::Text,
            "bytea" => DeclaredType::Bytea,
            "uuid" => DeclaredType::Uuid,
            "date" => DeclaredType::Date,
            "time" | "time without time zone" => DeclaredType::Time,
            "timestamp" | "timestamp without time zone" => DeclaredType::Timestamp,
            "timestamptz" | "timestamp with time zone" => DeclaredType::TimestampTz,
            "json" => DeclaredType::Json(JsonKind::Json),
            "jsonb" => DeclaredType::Json(JsonKind::Jsonb),
            _ => DeclaredType::Unrecognized,
        }
    }

    /// Whether values of this type are stored as JSON text.
    pub fn is_json(self) -> bool {
        matches!(self, DeclaredType::Json(_))
    }
}

/// Remove `(n)` / `(p,s)` modifiers and collapse whitespace.
fn strip_modifiers(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut depth = 0usize;
    for c in tag.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One decoded column of one change event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ColumnRecord")]
pub struct ChangeColumn {
    /// Column name, unique within the event.
    pub name: String,
    /// Type tag as carried by the decoder.
    pub declared_type: String,
    pub value: ColumnValue,
}

impl ChangeColumn {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        value: ColumnValue,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            value,
        }
    }

    /// Parsed form of the declared type tag.
    pub fn declared(&self) -> DeclaredType {
        DeclaredType::parse(&self.declared_type)
    }
}

/// File/record form of a change column.
///
/// `encoded: true` marks `value` as a pre-serialized JSON payload. A string
/// under a JSON-family type is always one.
#[derive(Debug, Deserialize)]
struct ColumnRecord {
    name: String,
    #[serde(rename = "type")]
    declared_type: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    encoded: bool,
}

impl TryFrom<ColumnRecord> for ChangeColumn {
    type Error = String;

    fn try_from(record: ColumnRecord) -> std::result::Result<Self, Self::Error> {
        use serde_json::Value;

        let value = if record.encoded {
            match record.value {
                Value::Null => ColumnValue::Null,
                Value::String(s) => ColumnValue::Encoded(EncodedPayload::Text(s)),
                other => {
                    return Err(format!(
                        "column {}: encoded value must be a JSON string, got {}",
                        record.name, other
                    ))
                }
            }
        } else if DeclaredType::parse(&record.declared_type).is_json() {
            match record.value {
                Value::Null => ColumnValue::Null,
                Value::String(s) => ColumnValue::Encoded(EncodedPayload::Text(s)),
                v => ColumnValue::Json(v),
            }
        } else {
            ColumnValue::from_json_scalar(record.value)
        };

        Ok(ChangeColumn {
            name: record.name,
            declared_type: record.declared_type,
            value,
        })
    }
}

/// Change action captured from the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Action {
    #[serde(rename = "I", alias = "insert")]
    Insert,
    #[serde(rename = "U", alias = "update")]
    Update,
    #[serde(rename = "D", alias = "delete")]
    Delete,
    #[serde(rename = "T", alias = "truncate")]
    Truncate,
}

/// One decoded insert/update/delete/truncate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeEvent {
    pub action: Action,
    pub schema: String,
    pub table: String,
    /// New row image. Empty for deletes and truncates.
    #[serde(default)]
    pub columns: Vec<ChangeColumn>,
    /// Old key image for updates and deletes.
    #[serde(default)]
    pub identity: Vec<ChangeColumn>,
}

impl ChangeEvent {
    pub fn new(
        action: Action,
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ChangeColumn>,
    ) -> Self {
        Self {
            action,
            schema: schema.into(),
            table: table.into(),
            columns,
            identity: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: Vec<ChangeColumn>) -> Self {
        self.identity = identity;
        self
    }

    /// `schema.table` key used for snapshot lookups.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Parse JSON lines, one event per line. Blank lines are ignored.
    pub fn from_jsonl(content: &str) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event = serde_json::from_str(line).map_err(|e| {
                ReplayError::InvalidEvent {
                    line: index + 1,
                    message: e.to_string(),
                }
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Load a JSON lines event file.
    pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<ChangeEvent>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_jsonl(&content)
    }
}
