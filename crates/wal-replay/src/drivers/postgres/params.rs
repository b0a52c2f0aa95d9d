//! Parameter binding for canonical values.
//!
//! Each [`SqlValue`] variant delegates to the matching tokio-postgres
//! encoder. Integer and float variants widen or narrow (checked) to the
//! parameter type the server inferred, and JSON text is written with the
//! jsonb version prefix when the parameter is `jsonb`.

use std::error::Error;

use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::adapter::copy::encode_numeric;
use crate::core::SqlValue;

type BoxError = Box<dyn Error + Sync + Send>;

const JSONB_VERSION: u8 = 1;

impl ToSql for SqlValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null(_) => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql_checked(ty, out),
            SqlValue::I16(v) => int_to_sql(i64::from(*v), ty, out),
            SqlValue::I32(v) => int_to_sql(i64::from(*v), ty, out),
            SqlValue::I64(v) => int_to_sql(*v, ty, out),
            SqlValue::F32(v) => float_to_sql(f64::from(*v), ty, out),
            SqlValue::F64(v) => float_to_sql(*v, ty, out),
            SqlValue::Text(v) => {
                let s: &str = v;
                s.to_sql_checked(ty, out)
            }
            SqlValue::Bytes(v) => {
                let b: &[u8] = v;
                b.to_sql_checked(ty, out)
            }
            SqlValue::Uuid(v) => v.to_sql_checked(ty, out),
            SqlValue::Decimal(v) => decimal_to_sql(v, ty, out),
            SqlValue::DateTime(v) => {
                if *ty == Type::TIMESTAMPTZ {
                    v.and_utc().to_sql_checked(ty, out)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            SqlValue::DateTimeOffset(v) => {
                if *ty == Type::TIMESTAMP {
                    v.naive_utc().to_sql_checked(ty, out)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            SqlValue::Date(v) => v.to_sql_checked(ty, out),
            SqlValue::Time(v) => v.to_sql_checked(ty, out),
            SqlValue::Json(_, body) => {
                if *ty == Type::JSONB {
                    out.put_u8(JSONB_VERSION);
                    out.extend_from_slice(body);
                    Ok(IsNull::No)
                } else if is_textual(ty) || *ty == Type::JSON {
                    out.extend_from_slice(body);
                    Ok(IsNull::No)
                } else {
                    Err(format!("cannot bind JSON text to parameter of type {}", ty).into())
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_textual(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT8 {
        v.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
        float_to_sql(v as f64, ty, out)
    } else if *ty == Type::NUMERIC {
        decimal_to_sql(&Decimal::from(v), ty, out)
    } else if is_textual(ty) {
        v.to_string().to_sql(ty, out)
    } else {
        v.to_sql_checked(ty, out)
    }
}

fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        let d = Decimal::try_from(v).map_err(|e| format!("{} as numeric: {}", v, e))?;
        decimal_to_sql(&d, ty, out)
    } else if is_textual(ty) {
        v.to_string().to_sql(ty, out)
    } else {
        v.to_sql_checked(ty, out)
    }
}

fn decimal_to_sql(v: &Decimal, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::NUMERIC {
        out.extend_from_slice(&encode_numeric(v));
        Ok(IsNull::No)
    } else if is_textual(ty) {
        v.to_string().to_sql(ty, out)
    } else {
        Err(format!("cannot bind numeric to parameter of type {}", ty).into())
    }
}
