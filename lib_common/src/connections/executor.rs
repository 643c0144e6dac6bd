//! # Query Executor Seam
//!
//! The results store is reached only through [`QueryExecutor::acquire`] and
//! [`StoreConnection::query`]. A connection is released when its box is
//! dropped, so every exit path of an operation (success, query error, decode
//! error) hands it back to the pool.

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime};
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use serde_json::{Map, Value};
use std::error::Error;
use thiserror::Error;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// All rows returned by one statement, in server order.
pub type RowSet = Vec<Row>;

/// Failures surfaced by the results store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The store could not be reached or the pool gave up waiting for a connection.
    #[error("{0}")]
    ConnectionUnavailable(String),
    /// The store was reached but rejected or failed the statement.
    #[error("{0}")]
    QueryFailed(String),
    /// A row came back in a shape the caller could not read.
    #[error("column `{column}`: {reason}")]
    Decode { column: String, reason: String },
}

/// Hands out pooled connections to the results store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Acquires one connection. Dropping the returned box releases it.
    async fn acquire(&self) -> Result<Box<dyn StoreConnection>, StoreError>;
}

/// A single acquired connection.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Runs one parameterised statement and returns its rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet, StoreError>;
}

/// A statement parameter.
///
/// Values are narrowed to whatever type the server inferred for the
/// placeholder, so an `Int` can bind an `INT2` lane code or an `INT8` id.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Json(Value),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl From<Value> for SqlValue {
    /// Scalars map onto their natural variant; arrays and objects stay JSON.
    fn from(v: Value) -> Self {
        match v {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s),
            other => SqlValue::Json(other),
        }
    }
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"];

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, Box<dyn Error + Sync + Send>> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(ts);
        }
    }
    Ok(NaiveDate::parse_from_str(text, "%Y-%m-%d")?.and_hms_opt(0, 0, 0).unwrap_or_default())
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if is_text(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if is_text(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(v) => {
                if *ty == Type::DATE {
                    NaiveDate::parse_from_str(v, "%Y-%m-%d")?.to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP {
                    parse_timestamp(v)?.to_sql(ty, out)
                } else if *ty == Type::INT2 {
                    v.trim().parse::<i16>()?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    v.trim().parse::<i32>()?.to_sql(ty, out)
                } else if *ty == Type::INT8 {
                    v.trim().parse::<i64>()?.to_sql(ty, out)
                } else if *ty == Type::BOOL {
                    v.trim().parse::<bool>()?.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    v.to_sql(ty, out)
                } else {
                    Err(format!("cannot bind a JSON document to a {} parameter", ty.name()).into())
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Reads an integer column that may arrive as a JSON number, a numeric
/// string, or null (null reads as zero, mirroring `COALESCE(x, 0)`).
pub fn column_i64(row: &Row, column: &str) -> Result<i64, StoreError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| StoreError::Decode {
            column: column.to_string(),
            reason: format!("{} is not an integer", n),
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|e| StoreError::Decode {
            column: column.to_string(),
            reason: e.to_string(),
        }),
        Some(other) => Err(StoreError::Decode {
            column: column.to_string(),
            reason: format!("unexpected value {}", other),
        }),
    }
}
