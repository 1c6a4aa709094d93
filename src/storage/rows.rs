// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Row-level helpers: dynamic bind values, chunked multi-row INSERTs and
//! column readers that cope with the `Any` driver's type quirks.

use serde::de::DeserializeOwned;
use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{AnyConnection, Row};
use tracing::debug;

use crate::error::StoreError;
use crate::metrics;

/// Rows per bulk statement.
pub const INSERT_CHUNK_SIZE: usize = 1000;

/// Upper bound on bind parameters in one statement (SQLite allows 32766,
/// MySQL 65535).
pub const MAX_BIND_PARAMS: usize = 30_000;

pub type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// A dynamically typed bind value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Text(Option<String>),
    Bytes(Option<Vec<u8>>),
}

impl SqlValue {
    pub fn int(v: i64) -> Self {
        SqlValue::Int(Some(v))
    }

    pub fn text(v: impl Into<String>) -> Self {
        SqlValue::Text(Some(v.into()))
    }

    pub fn null_text() -> Self {
        SqlValue::Text(None)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        SqlValue::Int(v)
    }
}

pub fn bind_value<'q>(query: AnyQuery<'q>, value: SqlValue) -> AnyQuery<'q> {
    match value {
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
    }
}

/// `?, ?, ?`
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// `(?, ?), (?, ?)`
pub fn row_placeholders(rows: usize, columns: usize) -> String {
    let row = format!("({})", placeholders(columns));
    vec![row; rows].join(", ")
}

/// Rows that fit in one statement for a given column count.
pub fn rows_per_statement(columns: usize) -> usize {
    INSERT_CHUNK_SIZE.min(MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Insert rows into `table` with as few statements as the chunk limits allow.
///
/// Unique violations surface as `Conflict`.
pub async fn bulk_insert(
    conn: &mut AnyConnection,
    table: &str,
    columns: &[&str],
    rows: Vec<Vec<SqlValue>>,
) -> Result<usize, StoreError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let per_statement = rows_per_statement(columns.len());
    let total = rows.len();
    let mut pending = rows.into_iter().peekable();
    let mut statements = 0usize;

    while pending.peek().is_some() {
        let chunk: Vec<Vec<SqlValue>> = pending.by_ref().take(per_statement).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            row_placeholders(chunk.len(), columns.len())
        );

        let mut query = sqlx::query(&sql);
        for row in chunk {
            if row.len() != columns.len() {
                return Err(StoreError::Internal(format!(
                    "bulk insert into {}: row has {} values for {} columns",
                    table,
                    row.len(),
                    columns.len()
                )));
            }
            for value in row {
                query = bind_value(query, value);
            }
        }

        query
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::from_write(&format!("insert into {}", table), e))?;
        statements += 1;
    }

    debug!(table, rows = total, statements, "Bulk insert complete");
    metrics::record_batch_rows(table, total);
    Ok(total)
}

/// Read a TEXT column. MySQL TEXT/LONGTEXT arrives as bytes through `Any`.
pub fn get_text(row: &AnyRow, column: &str) -> Result<Option<String>, StoreError> {
    if let Ok(value) = row.try_get::<Option<String>, _>(column) {
        return Ok(value);
    }
    let bytes: Option<Vec<u8>> = row
        .try_get(column)
        .map_err(|e| StoreError::internal(&format!("read column {}", column), e))?;
    bytes
        .map(|b| String::from_utf8(b).map_err(|e| StoreError::internal(&format!("decode column {}", column), e)))
        .transpose()
}

pub fn get_required_text(row: &AnyRow, column: &str) -> Result<String, StoreError> {
    get_text(row, column)?
        .ok_or_else(|| StoreError::Internal(format!("column {} is unexpectedly NULL", column)))
}

pub fn get_i64(row: &AnyRow, column: &str) -> Result<Option<i64>, StoreError> {
    row.try_get::<Option<i64>, _>(column)
        .map_err(|e| StoreError::internal(&format!("read column {}", column), e))
}

pub fn get_required_i64(row: &AnyRow, column: &str) -> Result<i64, StoreError> {
    get_i64(row, column)?
        .ok_or_else(|| StoreError::Internal(format!("column {} is unexpectedly NULL", column)))
}

pub fn get_bytes(row: &AnyRow, column: &str) -> Result<Option<Vec<u8>>, StoreError> {
    row.try_get::<Option<Vec<u8>>, _>(column)
        .map_err(|e| StoreError::internal(&format!("read column {}", column), e))
}

/// Decode a JSON payload column; NULL stays `None`.
pub fn get_json<T: DeserializeOwned>(row: &AnyRow, column: &str) -> Result<Option<T>, StoreError> {
    match get_text(row, column)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StoreError::internal(&format!("parse column {}", column), e)),
        None => Ok(None),
    }
}

/// Serialize an optional value into a JSON payload column.
pub fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, StoreError> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(|e| StoreError::internal("serialize payload", e)))
        .transpose()
}

/// Serialize an optional list into a JSON array column, `[]` when absent.
pub fn to_json_array<T: serde::Serialize>(value: &Option<Vec<T>>) -> Result<String, StoreError> {
    match value {
        Some(items) => serde_json::to_string(items).map_err(|e| StoreError::internal("serialize payload", e)),
        None => Ok("[]".to_string()),
    }
}

/// Decode a JSON array column; an empty array reads back as absent.
pub fn get_json_array<T: DeserializeOwned>(row: &AnyRow, column: &str) -> Result<Option<Vec<T>>, StoreError> {
    Ok(get_json::<Vec<T>>(row, column)?.filter(|items| !items.is_empty()))
}
