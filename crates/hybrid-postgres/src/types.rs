//! Value mapping between Rust and PostgreSQL.
//!
//! `Value` is the engine's single cell representation: statement parameters
//! are bound from it, result rows are decoded into it, and literal SQL text for
//! logging and cache digests is rendered from it. `Key` is the hashable subset
//! usable as a primary key.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgHasArrayType, PgRow};
use sqlx::{Arguments, Column, Encode, Postgres, Row as SqlxRow, Type, TypeInfo};
use std::fmt;
use uuid::Uuid;

use crate::{HybridError, Result};

/// One decoded row: column name and value pairs in result order.
pub type Row = Vec<(String, Value)>;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean (BOOLEAN)
    Bool(bool),
    /// Small integer (SMALLINT)
    SmallInt(i16),
    /// Integer (INTEGER)
    Int(i32),
    /// Big integer (BIGINT)
    BigInt(i64),
    /// Single-precision float (REAL)
    Float(f32),
    /// Double-precision float (DOUBLE PRECISION)
    Double(f64),
    /// Variable-length string (VARCHAR, TEXT)
    String(String),
    /// Binary data (BYTEA)
    Bytes(Vec<u8>),
    /// UUID (UUID)
    Uuid(Uuid),
    /// Date (DATE)
    Date(NaiveDate),
    /// Time (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    Timestamp(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    TimestampTz(DateTime<Utc>),
    /// JSON/JSONB (JSON, JSONB)
    Json(JsonValue),
    /// Array of values (ARRAY)
    Array(Vec<Value>),
    /// Decimal/Numeric (NUMERIC, DECIMAL)
    Decimal(Decimal),
}

impl Value {
    /// Returns the PostgreSQL type name for this value.
    pub fn pg_type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "REAL",
            Value::Double(_) => "DOUBLE PRECISION",
            Value::String(_) => "TEXT",
            Value::Bytes(_) => "BYTEA",
            Value::Uuid(_) => "UUID",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::TimestampTz(_) => "TIMESTAMPTZ",
            Value::Json(_) => "JSONB",
            Value::Array(_) => "ARRAY",
            Value::Decimal(_) => "NUMERIC",
        }
    }

    /// Builds an array value from any iterator of convertible items.
    pub fn array<I, T>(items: I) -> Value
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            Value::Decimal(d) if d.fract().is_zero() => i64::try_from(*d).ok(),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view used by aggregates. NULL reads as zero.
    pub fn to_decimal(&self) -> Result<Decimal> {
        match self {
            Value::Null => Ok(Decimal::ZERO),
            Value::SmallInt(v) => Ok(Decimal::from(*v)),
            Value::Int(v) => Ok(Decimal::from(*v)),
            Value::BigInt(v) => Ok(Decimal::from(*v)),
            Value::Decimal(v) => Ok(*v),
            Value::Float(v) => Decimal::from_f32(*v)
                .ok_or_else(|| HybridError::Deserialization(format!("{} is not a finite number", v))),
            Value::Double(v) => Decimal::from_f64(*v)
                .ok_or_else(|| HybridError::Deserialization(format!("{} is not a finite number", v))),
            other => Err(HybridError::Deserialization(format!(
                "Expected a numeric value, got {}",
                other.pg_type_name()
            ))),
        }
    }

    /// Bind this value to a sqlx argument list.
    ///
    /// Homogeneous arrays bind as native PostgreSQL arrays (INT4[], TEXT[],
    /// UUID[], ...); anything else falls back to a JSON array.
    pub fn bind_to_arguments(&self, arguments: &mut PgArguments) -> Result<()> {
        match self {
            // Typed nulls are rendered inline by the statement builder; this
            // branch only serves hand-written statements.
            Value::Null => add(arguments, Option::<String>::None, "NULL"),
            Value::Bool(v) => add(arguments, *v, "BOOL"),
            Value::SmallInt(v) => add(arguments, *v, "SMALLINT"),
            Value::Int(v) => add(arguments, *v, "INT"),
            Value::BigInt(v) => add(arguments, *v, "BIGINT"),
            Value::Float(v) => add(arguments, *v, "FLOAT"),
            Value::Double(v) => add(arguments, *v, "DOUBLE"),
            Value::String(v) => add(arguments, v.clone(), "STRING"),
            Value::Bytes(v) => add(arguments, v.clone(), "BYTES"),
            Value::Uuid(v) => add(arguments, *v, "UUID"),
            Value::Date(v) => add(arguments, *v, "DATE"),
            Value::Time(v) => add(arguments, *v, "TIME"),
            Value::Timestamp(v) => add(arguments, *v, "TIMESTAMP"),
            Value::TimestampTz(v) => add(arguments, *v, "TIMESTAMPTZ"),
            Value::Json(v) => add(arguments, v.clone(), "JSON"),
            Value::Decimal(v) => add(arguments, *v, "DECIMAL"),
            Value::Array(values) => bind_array(values, arguments),
        }
    }

    /// Renders the value as a SQL literal.
    ///
    /// Used for log output and cache digests only; statements sent to the
    /// server always carry bound parameters.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(v) => if *v { "true".to_string() } else { "false".to_string() },
            Value::SmallInt(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Decimal(v) => v.to_string(),
            Value::String(v) => quote_literal(v),
            Value::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
                format!("'\\x{}'::bytea", hex)
            }
            Value::Uuid(v) => format!("'{}'::uuid", v),
            Value::Date(v) => format!("'{}'::date", v),
            Value::Time(v) => format!("'{}'::time", v),
            Value::Timestamp(v) => format!("'{}'::timestamp", v),
            Value::TimestampTz(v) => format!("'{}'::timestamptz", v.to_rfc3339()),
            Value::Json(v) => format!("{}::jsonb", quote_literal(&v.to_string())),
            Value::Array(values) => {
                let items: Vec<String> = values.iter().map(Value::to_sql_literal).collect();
                format!("ARRAY[{}]", items.join(", "))
            }
        }
    }

    /// Converts the value into its JSON form.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(v) => JsonValue::Bool(*v),
            Value::SmallInt(v) => JsonValue::Number((*v).into()),
            Value::Int(v) => JsonValue::Number((*v).into()),
            Value::BigInt(v) => JsonValue::Number((*v).into()),
            Value::Float(v) => serde_json::Number::from_f64(*v as f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(v) => JsonValue::String(v.clone()),
            Value::Bytes(v) => JsonValue::String(v.iter().map(|b| format!("{:02x}", b)).collect()),
            Value::Uuid(v) => JsonValue::String(v.to_string()),
            Value::Date(v) => JsonValue::String(v.to_string()),
            Value::Time(v) => JsonValue::String(v.to_string()),
            Value::Timestamp(v) => JsonValue::String(v.to_string()),
            Value::TimestampTz(v) => JsonValue::String(v.to_rfc3339()),
            Value::Json(v) => v.clone(),
            Value::Array(values) => JsonValue::Array(values.iter().map(Value::to_json).collect()),
            Value::Decimal(v) => JsonValue::String(v.to_string()),
        }
    }
}

fn add<T>(arguments: &mut PgArguments, value: T, label: &str) -> Result<()>
where
    T: for<'q> Encode<'q, Postgres> + Type<Postgres> + Send + 'static,
{
    arguments
        .add(value)
        .map_err(|e| HybridError::Query(format!("Failed to bind {}: {}", label, e)))
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Collects an array whose elements all match `pick` (NULLs allowed).
fn homogeneous<T>(values: &[Value], pick: impl Fn(&Value) -> Option<T>) -> Option<Vec<Option<T>>> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => Some(None),
            other => pick(other).map(Some),
        })
        .collect()
}

fn bind_native<T>(values: &[Value], arguments: &mut PgArguments, label: &str, pick: impl Fn(&Value) -> Option<T>) -> Option<Result<()>>
where
    T: for<'q> Encode<'q, Postgres> + Type<Postgres> + PgHasArrayType + Send + 'static,
{
    homogeneous(values, pick).map(|items| add(arguments, items, label))
}

fn bind_array(values: &[Value], arguments: &mut PgArguments) -> Result<()> {
    let first = values.iter().find(|v| !v.is_null());
    let bound = match first {
        None => Some(add(arguments, Option::<Vec<String>>::None, "empty ARRAY")),
        Some(Value::Bool(_)) => bind_native(values, arguments, "BOOL[]", |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        }),
        Some(Value::SmallInt(_)) => bind_native(values, arguments, "INT2[]", |v| match v {
            Value::SmallInt(i) => Some(*i),
            _ => None,
        }),
        Some(Value::Int(_)) => bind_native(values, arguments, "INT4[]", |v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        }),
        Some(Value::BigInt(_)) => bind_native(values, arguments, "INT8[]", |v| match v {
            Value::BigInt(i) => Some(*i),
            _ => None,
        }),
        Some(Value::Double(_)) => bind_native(values, arguments, "FLOAT8[]", |v| match v {
            Value::Double(f) => Some(*f),
            _ => None,
        }),
        Some(Value::String(_)) => bind_native(values, arguments, "TEXT[]", |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }),
        Some(Value::Uuid(_)) => bind_native(values, arguments, "UUID[]", |v| match v {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }),
        _ => None,
    };

    match bound {
        Some(result) => result,
        // Heterogeneous or complex arrays fall back to JSON
        None => add(
            arguments,
            JsonValue::Array(values.iter().map(Value::to_json).collect()),
            "ARRAY as JSON",
        ),
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    JsonValue => Json,
    Decimal => Decimal,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}


impl From<Key> for Value {
    fn from(k: Key) -> Self {
        match k {
            Key::Int(i) => Value::BigInt(i),
            Key::Text(s) => Value::String(s),
            Key::Uuid(u) => Value::Uuid(u),
        }
    }
}

/// Primary-key value.
///
/// Integer widths collapse into `Int` so keys decoded from INT4 and INT8
/// columns compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Text(String),
    Uuid(Uuid),
}

impl Key {
    /// Extracts a key from a cell, if the cell holds a keyable type.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::SmallInt(v) => Some(Key::Int(*v as i64)),
            Value::Int(v) => Some(Key::Int(*v as i64)),
            Value::BigInt(v) => Some(Key::Int(*v)),
            Value::String(v) => Some(Key::Text(v.clone())),
            Value::Uuid(v) => Some(Key::Uuid(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Text(s) => write!(f, "{}", s),
            Key::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(v as i64)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Text(v)
    }
}

impl From<Uuid> for Key {
    fn from(v: Uuid) -> Self {
        Key::Uuid(v)
    }
}

/// Decodes a `PgRow` into ordered `(column, Value)` pairs.
pub fn decode_row(row: &PgRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name().to_string();
        let value = decode_cell(row, idx, &name, &type_name)?;
        columns.push((name, value));
    }

    Ok(columns)
}

fn cell<T>(row: &PgRow, idx: usize, column: &str, wrap: impl Fn(T) -> Value) -> Result<Value>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Ok(wrap(v)),
        Ok(None) => Ok(Value::Null),
        Err(e) => Err(HybridError::Deserialization(format!(
            "Failed to decode column '{}': {}",
            column, e
        ))),
    }
}

fn array_cell<T>(row: &PgRow, idx: usize, column: &str, wrap: impl Fn(T) -> Value) -> Result<Value>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + Type<Postgres> + PgHasArrayType,
{
    cell::<Vec<T>>(row, idx, column, |items| Value::Array(items.into_iter().map(&wrap).collect()))
}

fn decode_cell(row: &PgRow, idx: usize, column: &str, type_name: &str) -> Result<Value> {
    match type_name {
        "BOOL" | "BOOLEAN" => cell(row, idx, column, Value::Bool),
        "INT2" | "SMALLINT" => cell(row, idx, column, Value::SmallInt),
        "INT4" | "INTEGER" | "INT" => cell(row, idx, column, Value::Int),
        "INT8" | "BIGINT" => cell(row, idx, column, Value::BigInt),
        "FLOAT4" | "REAL" => cell(row, idx, column, Value::Float),
        "FLOAT8" | "DOUBLE PRECISION" => cell(row, idx, column, Value::Double),
        "VARCHAR" | "TEXT" | "CHAR" | "BPCHAR" | "NAME" => cell(row, idx, column, Value::String),
        "BYTEA" => cell(row, idx, column, Value::Bytes),
        "UUID" => cell(row, idx, column, Value::Uuid),
        "DATE" => cell(row, idx, column, Value::Date),
        "TIME" => cell(row, idx, column, Value::Time),
        "TIMESTAMP" => cell(row, idx, column, Value::Timestamp),
        "TIMESTAMPTZ" => cell(row, idx, column, Value::TimestampTz),
        "JSON" | "JSONB" => cell(row, idx, column, Value::Json),
        "NUMERIC" => cell(row, idx, column, Value::Decimal),
        "_BOOL" => array_cell(row, idx, column, Value::Bool),
        "_INT2" => array_cell(row, idx, column, Value::SmallInt),
        "_INT4" => array_cell(row, idx, column, Value::Int),
        "_INT8" => array_cell(row, idx, column, Value::BigInt),
        "_FLOAT8" => array_cell(row, idx, column, Value::Double),
        "_TEXT" | "_VARCHAR" => array_cell(row, idx, column, Value::String),
        "_UUID" => array_cell(row, idx, column, Value::Uuid),
        unknown => {
            tracing::warn!("Unknown PostgreSQL type '{}' for column '{}', attempting string extraction", unknown, column);
            cell(row, idx, column, Value::String)
        }
    }
}
