//! SQL value types shared by the source and target stores.
//!
//! Source rows are decoded into owned [`SqlValue`]s so that transcoders can be
//! plain functions over a [`Row`] with no database handle in scope.

use std::error::Error as StdError;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::error::{MigrateError, Result};

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL of any type.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (double precision).
    F64(f64),

    /// Numeric/decimal with arbitrary precision.
    Decimal(Decimal),

    /// Text/varchar/char data.
    Text(String),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone, normalized to UTC.
    DateTimeUtc(DateTime<Utc>),

    /// Date without time component.
    Date(NaiveDate),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short type name used in decode errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I16(_) => "smallint",
            SqlValue::I32(_) => "integer",
            SqlValue::I64(_) => "bigint",
            SqlValue::F32(_) => "real",
            SqlValue::F64(_) => "double precision",
            SqlValue::Decimal(_) => "numeric",
            SqlValue::Text(_) => "text",
            SqlValue::DateTime(_) => "timestamp",
            SqlValue::DateTimeUtc(_) => "timestamptz",
            SqlValue::Date(_) => "date",
        }
    }

    /// Widen any integer variant to i64. A numeric converts only when it
    /// has no fractional part and fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    /// Borrow the text payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Encoding converts numbers to the declared parameter type so the same value
/// works against smallint, integer, bigint, float or numeric columns.
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I16(v) => encode_int(i64::from(*v), ty, out),
            SqlValue::I32(v) => encode_int(i64::from(*v), ty, out),
            SqlValue::I64(v) => encode_int(*v, ty, out),
            SqlValue::F32(v) => encode_float(f64::from(*v), ty, out),
            SqlValue::F64(v) => encode_float(*v, ty, out),
            SqlValue::Decimal(v) => encode_decimal(v, ty, out),
            SqlValue::Text(v) => v.as_str().to_sql(ty, out),
            SqlValue::DateTime(v) => {
                if *ty == Type::TIMESTAMPTZ {
                    Utc.from_utc_datetime(v).to_sql(ty, out)
                } else if *ty == Type::DATE {
                    v.date().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::DateTimeUtc(v) => {
                if *ty == Type::TIMESTAMP {
                    v.naive_utc().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Date(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn encode_int(
    v: i64,
    ty: &Type,
    out: &mut BytesMut,
) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

fn encode_float(
    v: f64,
    ty: &Type,
    out: &mut BytesMut,
) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::from_f64(v)
            .ok_or_else(|| format!("{} does not fit numeric", v))?
            .to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

fn encode_decimal(
    v: &Decimal,
    ty: &Type,
    out: &mut BytesMut,
) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match *ty {
        Type::FLOAT4 | Type::FLOAT8 => v
            .to_f64()
            .ok_or_else(|| format!("{} does not fit a float", v))
            .map(|f| encode_float(f, ty, out))?,
        Type::INT2 | Type::INT4 | Type::INT8 => SqlValue::Decimal(*v)
            .as_i64()
            .ok_or_else(|| format!("{} is not an integer", v))
            .map(|i| encode_int(i, ty, out))?,
        _ => v.to_sql(ty, out),
    }
}

/// One row read from a cursor, in the column order of its query.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from values in query column order.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw access to the values.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the row.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    fn value(&self, idx: usize, name: &'static str) -> Result<&SqlValue> {
        self.values.get(idx).ok_or_else(|| MigrateError::Decode {
            column: idx,
            name: name.to_string(),
            message: format!("row has only {} columns", self.values.len()),
        })
    }

    fn mismatch(idx: usize, name: &'static str, expected: &str, found: &SqlValue) -> MigrateError {
        MigrateError::Decode {
            column: idx,
            name: name.to_string(),
            message: format!("expected {}, found {}", expected, found.type_name()),
        }
    }

    /// Nullable integer of any width.
    pub fn opt_i64(&self, idx: usize, name: &'static str) -> Result<Option<i64>> {
        match self.value(idx, name)? {
            SqlValue::Null => Ok(None),
            v => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| Self::mismatch(idx, name, "integer", v)),
        }
    }

    /// Non-null integer of any width.
    pub fn i64(&self, idx: usize, name: &'static str) -> Result<i64> {
        self.opt_i64(idx, name)?.ok_or_else(|| MigrateError::Decode {
            column: idx,
            name: name.to_string(),
            message: "unexpected NULL".into(),
        })
    }

    /// Nullable float; integers are widened.
    pub fn opt_f64(&self, idx: usize, name: &'static str) -> Result<Option<f64>> {
        match self.value(idx, name)? {
            SqlValue::Null => Ok(None),
            SqlValue::F32(v) => Ok(Some(f64::from(*v))),
            SqlValue::F64(v) => Ok(Some(*v)),
            SqlValue::Decimal(d) => d
                .to_f64()
                .map(Some)
                .ok_or_else(|| Self::mismatch(idx, name, "float", &SqlValue::Decimal(*d))),
            v => v
                .as_i64()
                .map(|i| Some(i as f64))
                .ok_or_else(|| Self::mismatch(idx, name, "float", v)),
        }
    }

    /// Nullable boolean.
    pub fn opt_bool(&self, idx: usize, name: &'static str) -> Result<Option<bool>> {
        match self.value(idx, name)? {
            SqlValue::Null => Ok(None),
            SqlValue::Bool(b) => Ok(Some(*b)),
            v => Err(Self::mismatch(idx, name, "bool", v)),
        }
    }

    /// Nullable text.
    pub fn opt_text(&self, idx: usize, name: &'static str) -> Result<Option<String>> {
        match self.value(idx, name)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            v => Err(Self::mismatch(idx, name, "text", v)),
        }
    }

    /// Non-null text.
    pub fn text(&self, idx: usize, name: &'static str) -> Result<String> {
        self.opt_text(idx, name)?.ok_or_else(|| MigrateError::Decode {
            column: idx,
            name: name.to_string(),
            message: "unexpected NULL".into(),
        })
    }

    /// Nullable timestamp; timestamptz values are read as UTC wall time.
    pub fn opt_datetime(&self, idx: usize, name: &'static str) -> Result<Option<NaiveDateTime>> {
        match self.value(idx, name)? {
            SqlValue::Null => Ok(None),
            SqlValue::DateTime(v) => Ok(Some(*v)),
            SqlValue::DateTimeUtc(v) => Ok(Some(v.naive_utc())),
            SqlValue::Date(d) => Ok(d.and_hms_opt(0, 0, 0)),
            v => Err(Self::mismatch(idx, name, "timestamp", v)),
        }
    }

    /// Non-null timestamp.
    pub fn datetime(&self, idx: usize, name: &'static str) -> Result<NaiveDateTime> {
        self.opt_datetime(idx, name)?
            .ok_or_else(|| MigrateError::Decode {
                column: idx,
                name: name.to_string(),
                message: "unexpected NULL".into(),
            })
    }
}

impl From<Vec<SqlValue>> for Row {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::new(values)
    }
}
