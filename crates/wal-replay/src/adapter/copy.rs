//! COPY FROM STDIN payload encoding for bulk rows.
//!
//! Runs after canonicalization: JSON values are already JSON text here and
//! are only escaped (text) or length-prefixed (binary), never re-encoded.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{JsonKind, SqlValue};
use crate::dispatch::dml::{qualify_table, quote_ident};
use crate::error::{ReplayError, Result};

use super::AdaptedRow;

const PGCOPY_SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";

/// Microseconds between the Unix epoch and 2000-01-01.
const PG_EPOCH_MICROS: i64 = 946_684_800_000_000;

/// `num_days_from_ce` of 2000-01-01.
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;

const JSONB_VERSION: u8 = 1;

/// COPY payload format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyFormat {
    #[default]
    Text,
    Binary,
}

impl CopyFormat {
    pub fn as_sql(self) -> &'static str {
        match self {
            CopyFormat::Text => "TEXT",
            CopyFormat::Binary => "BINARY",
        }
    }
}

impl std::fmt::Display for CopyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyFormat::Text => write!(f, "text"),
            CopyFormat::Binary => write!(f, "binary"),
        }
    }
}

impl std::str::FromStr for CopyFormat {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(CopyFormat::Text),
            "binary" => Ok(CopyFormat::Binary),
            other => Err(ReplayError::Config(format!(
                "unknown COPY format '{}' (expected text or binary)",
                other
            ))),
        }
    }
}

/// Build `COPY "schema"."table" ("a", "b") FROM STDIN WITH (FORMAT ...)`.
pub fn copy_statement(schema: &str, table: &str, columns: &[&str], format: CopyFormat) -> String {
    let col_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT {})",
        qualify_table(schema, table),
        col_list.join(", "),
        format.as_sql()
    )
}

/// Accumulates bulk rows into a single COPY payload.
#[derive(Debug)]
pub struct CopyEncoder {
    format: CopyFormat,
    buf: BytesMut,
    rows: u64,
}

impl CopyEncoder {
    pub fn new(format: CopyFormat) -> Self {
        let mut buf = BytesMut::with_capacity(4096);
        if format == CopyFormat::Binary {
            buf.put_slice(PGCOPY_SIGNATURE);
            buf.put_i32(0); // flags
            buf.put_i32(0); // header extension length
        }
        Self {
            format,
            buf,
            rows: 0,
        }
    }

    pub fn format(&self) -> CopyFormat {
        self.format
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Append one adapted row. On error nothing is written.
    pub fn push_row(&mut self, row: &AdaptedRow<'_>) -> Result<()> {
        let mut scratch = BytesMut::with_capacity(row.len() * 16);
        match self.format {
            CopyFormat::Text => {
                for (i, value) in row.values.iter().enumerate() {
                    if i > 0 {
                        scratch.put_u8(b'\t');
                    }
                    let text = value_to_text(value)
                        .map_err(|_| unsupported(row, i, self.format))?;
                    scratch.put_slice(text.as_bytes());
                }
                scratch.put_u8(b'\n');
            }
            CopyFormat::Binary => {
                let count = i16::try_from(row.len()).map_err(|_| {
                    ReplayError::Config(format!("row has too many columns for COPY: {}", row.len()))
                })?;
                scratch.put_i16(count);
                for (i, value) in row.values.iter().enumerate() {
                    write_binary_value(&mut scratch, value)
                        .map_err(|_| unsupported(row, i, self.format))?;
                }
            }
        }
        self.buf.extend_from_slice(&scratch);
        self.rows += 1;
        Ok(())
    }

    /// Close the stream and return the payload.
    pub fn finish(mut self) -> Bytes {
        if self.format == CopyFormat::Binary {
            self.buf.put_i16(-1);
        }
        self.buf.freeze()
    }
}

fn unsupported(row: &AdaptedRow<'_>, index: usize, format: CopyFormat) -> ReplayError {
    ReplayError::UnsupportedWireType {
        column: row.names.get(index).copied().unwrap_or_default().to_string(),
        declared_type: row.declared_types.get(index).copied().unwrap_or_default().to_string(),
        format: format.to_string(),
    }
}

/// Marker for values with no COPY representation.
#[derive(Debug)]
struct NotEncodable;

/// Write a SqlValue as a length-prefixed binary COPY field.
fn write_binary_value(buf: &mut BytesMut, value: &SqlValue<'_>) -> std::result::Result<(), NotEncodable> {
    match value {
        SqlValue::Null(_) => buf.put_i32(-1),
        SqlValue::Bool(b) => {
            buf.put_i32(1);
            buf.put_u8(u8::from(*b));
        }
        SqlValue::I16(i) => {
            buf.put_i32(2);
            buf.put_i16(*i);
        }
        SqlValue::I32(i) => {
            buf.put_i32(4);
            buf.put_i32(*i);
        }
        SqlValue::I64(i) => {
            buf.put_i32(8);
            buf.put_i64(*i);
        }
        SqlValue::F32(f) => {
            buf.put_i32(4);
            buf.put_f32(*f);
        }
        SqlValue::F64(f) => {
            buf.put_i32(8);
            buf.put_f64(*f);
        }
        SqlValue::Text(s) => put_field(buf, s.as_bytes())?,
        SqlValue::Bytes(b) => put_field(buf, b)?,
        SqlValue::Uuid(u) => put_field(buf, u.as_bytes())?,
        SqlValue::Decimal(d) => {
            let body = encode_numeric(d);
            put_field(buf, &body)?;
        }
        SqlValue::DateTime(dt) => {
            buf.put_i32(8);
            buf.put_i64(dt.and_utc().timestamp_micros() - PG_EPOCH_MICROS);
        }
        SqlValue::DateTimeOffset(dto) => {
            buf.put_i32(8);
            buf.put_i64(dto.timestamp_micros() - PG_EPOCH_MICROS);
        }
        SqlValue::Date(d) => {
            buf.put_i32(4);
            buf.put_i32(d.num_days_from_ce() - PG_EPOCH_DAYS_FROM_CE);
        }
        SqlValue::Time(t) => {
            buf.put_i32(8);
            buf.put_i64(time_micros(t));
        }
        SqlValue::Json(JsonKind::Jsonb, body) => {
            let len = i32::try_from(body.len() + 1).map_err(|_| NotEncodable)?;
            buf.put_i32(len);
            buf.put_u8(JSONB_VERSION);
            buf.put_slice(body);
        }
        SqlValue::Json(JsonKind::Json, body) => put_field(buf, body)?,
        SqlValue::Json(_, _) => return Err(NotEncodable),
    }
    Ok(())
}

fn put_field(buf: &mut BytesMut, bytes: &[u8]) -> std::result::Result<(), NotEncodable> {
    let len = i32::try_from(bytes.len()).map_err(|_| NotEncodable)?;
    buf.put_i32(len);
    buf.put_slice(bytes);
    Ok(())
}

fn time_micros(t: &chrono::NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight()) * 1_000_000 + i64::from(t.nanosecond() / 1000)
}

/// Encode a Decimal as a PostgreSQL binary NUMERIC body (no length prefix).
///
/// Layout: `ndigits`, `weight`, `sign`, `dscale` (all i16) followed by
/// `ndigits` base-10000 digits, most significant first. Digits are grouped
/// from the decimal point outwards, so the scaled mantissa is padded to a
/// multiple of four fractional digits before splitting.
pub(crate) fn encode_numeric(d: &Decimal) -> Vec<u8> {
    const NUMERIC_POS: u16 = 0x0000;
    const NUMERIC_NEG: u16 = 0x4000;

    let scale = d.scale();
    let mut out = Vec::with_capacity(16);

    if d.is_zero() {
        out.extend_from_slice(&0i16.to_be_bytes());
        out.extend_from_slice(&0i16.to_be_bytes());
        out.extend_from_slice(&NUMERIC_POS.to_be_bytes());
        out.extend_from_slice(&(scale as i16).to_be_bytes());
        return out;
    }

    let pad = (4 - scale % 4) % 4;
    // Mantissa is at most 96 bits, so padding by 10^3 stays well inside u128.
    let mut mantissa = d.mantissa().unsigned_abs() * 10u128.pow(pad);
    let frac_groups = ((scale + pad) / 4) as i16;

    let mut digits: Vec<i16> = Vec::new();
    while mantissa > 0 {
        digits.push((mantissa % 10_000) as i16);
        mantissa /= 10_000;
    }
    digits.reverse();

    let weight = digits.len() as i16 - frac_groups - 1;
    while digits.last() == Some(&0) {
        digits.pop();
    }

    let sign = if d.is_sign_negative() { NUMERIC_NEG } else { NUMERIC_POS };
    out.extend_from_slice(&(digits.len() as i16).to_be_bytes());
    out.extend_from_slice(&weight.to_be_bytes());
    out.extend_from_slice(&sign.to_be_bytes());
    out.extend_from_slice(&(scale as i16).to_be_bytes());
    for digit in digits {
        out.extend_from_slice(&digit.to_be_bytes());
    }
    out
}

/// Convert a SqlValue to its COPY text field.
fn value_to_text(value: &SqlValue<'_>) -> std::result::Result<String, NotEncodable> {
    Ok(match value {
        SqlValue::Null(_) => "\\N".to_string(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        SqlValue::I16(i) => i.to_string(),
        SqlValue::I32(i) => i.to_string(),
        SqlValue::I64(i) => i.to_string(),
        SqlValue::F32(f) => float_text(f64::from(*f)),
        SqlValue::F64(f) => float_text(*f),
        SqlValue::Text(s) => escape_copy_text(s),
        SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b.as_ref())),
        SqlValue::Uuid(u) => u.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        SqlValue::DateTimeOffset(dto) => dto.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
        SqlValue::Json(kind, _) if kind.is_array() => return Err(NotEncodable),
        SqlValue::Json(_, body) => {
            escape_copy_text(std::str::from_utf8(body).map_err(|_| NotEncodable)?)
        }
    })
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

/// Escape text for PostgreSQL COPY.
pub(crate) fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
