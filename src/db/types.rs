//! Row decoding for the sqlx backend.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's declared type
//! 2. A single generic decoder tries the Rust types for that category in
//!    order, falling back to text, then to `null`
//!
//! The decoder is generic over `sqlx::Row`, so one code path serves
//! PostgreSQL, MySQL and SQLite rows.

use crate::models::{DatabaseType, Row};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::{SqliteRow, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Column, ColumnIndex, Database, Decode, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first: "numeric" would otherwise fall through to the float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity is really a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

/// DECIMAL/NUMERIC value kept as its exact textual representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Sqlite> for RawDecimal {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }

    // Values carry their storage class, not the declared type; SQLite renders
    // any of them as text.
    fn compatible(_ty: &SqliteTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for RawDecimal {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Types decodable from any row of database `DB`.
pub trait Decodable<DB: Database>: for<'r> Decode<'r, DB> + Type<DB> {}

impl<DB: Database, T> Decodable<DB> for T where T: for<'r> Decode<'r, DB> + Type<DB> {}

/// Conversion of a database row into a JSON row.
pub trait RowToJson {
    fn to_json_row(&self) -> Row;
}

impl RowToJson for PgRow {
    fn to_json_row(&self) -> Row {
        decode_row(self, DatabaseType::PostgreSQL)
    }
}

impl RowToJson for MySqlRow {
    fn to_json_row(&self) -> Row {
        decode_row(self, DatabaseType::MySQL)
    }
}

impl RowToJson for SqliteRow {
    fn to_json_row(&self) -> Row {
        decode_row(self, DatabaseType::SQLite)
    }
}

fn decode_row<R>(row: &R, db: DatabaseType) -> Row
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    i16: Decodable<R::Database>,
    i32: Decodable<R::Database>,
    i64: Decodable<R::Database>,
    f32: Decodable<R::Database>,
    f64: Decodable<R::Database>,
    bool: Decodable<R::Database>,
    String: Decodable<R::Database>,
    Vec<u8>: Decodable<R::Database>,
    JsonValue: Decodable<R::Database>,
    RawDecimal: Decodable<R::Database>,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name(), db);
            let value = match category {
                TypeCategory::Integer => decode_integer(row, idx),
                TypeCategory::Float => decode_float(row, idx),
                TypeCategory::Decimal => get::<R, RawDecimal>(row, idx)
                    .map(|v| v.map(|d| JsonValue::String(d.0))),
                TypeCategory::Boolean => get::<R, bool>(row, idx).map(|v| v.map(JsonValue::Bool)),
                TypeCategory::Binary => get::<R, Vec<u8>>(row, idx).map(|v| v.map(encode_binary)),
                TypeCategory::Json => get::<R, JsonValue>(row, idx),
                TypeCategory::Text => Err(()),
            };
            // Anything the category decoder could not read is retried as text.
            let value = value.unwrap_or_else(|()| decode_text(row, idx));
            (col.name().to_string(), value.unwrap_or(JsonValue::Null))
        })
        .collect()
}

/// `Ok(None)` for SQL NULL, `Err(())` when the column is not of type `T`.
fn get<R, T>(row: &R, idx: usize) -> Result<Option<T>, ()>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: Decodable<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).map_err(|_| ())
}

fn decode_integer<R>(row: &R, idx: usize) -> Result<Option<JsonValue>, ()>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    i16: Decodable<R::Database>,
    i32: Decodable<R::Database>,
    i64: Decodable<R::Database>,
{
    get::<R, i64>(row, idx)
        .or_else(|()| get::<R, i32>(row, idx).map(|v| v.map(i64::from)))
        .or_else(|()| get::<R, i16>(row, idx).map(|v| v.map(i64::from)))
        .map(|v| v.map(|n| JsonValue::Number(n.into())))
}

fn decode_float<R>(row: &R, idx: usize) -> Result<Option<JsonValue>, ()>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    f32: Decodable<R::Database>,
    f64: Decodable<R::Database>,
{
    get::<R, f64>(row, idx)
        .or_else(|()| get::<R, f32>(row, idx).map(|v| v.map(f64::from)))
        .map(|v| v.map(float_value))
}

/// Text, then the other primitive shapes for untyped columns (SQLite).
fn decode_text<R>(row: &R, idx: usize) -> Option<JsonValue>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    i64: Decodable<R::Database>,
    f64: Decodable<R::Database>,
    String: Decodable<R::Database>,
    Vec<u8>: Decodable<R::Database>,
{
    get::<R, String>(row, idx)
        .map(|v| v.map(JsonValue::String))
        .or_else(|()| get::<R, i64>(row, idx).map(|v| v.map(|n| JsonValue::Number(n.into()))))
        .or_else(|()| get::<R, f64>(row, idx).map(|v| v.map(float_value)))
        .or_else(|()| get::<R, Vec<u8>>(row, idx).map(|v| v.map(encode_binary)))
        .ok()
        .flatten()
}

/// NaN and infinities have no JSON number form; they are kept as strings.
fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Binary columns are returned base64 encoded.
pub fn encode_binary(bytes: Vec<u8>) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}
