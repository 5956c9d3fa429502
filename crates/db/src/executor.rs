use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use carseek_core::ResultRow;

use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum QueryExecutionError {
    #[error("query text is empty after stripping code fences")]
    EmptyQuery,
    #[error("query execution failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not decode column `{column}`: {message}")]
    Decode { column: String, message: String },
}

/// Runs one generated statement and returns its rows as JSON objects.
///
/// Callers hand over model output verbatim. Every call is a single
/// autocommit statement, so a failed query never leaves a transaction open.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query_text: &str) -> Result<Vec<ResultRow>, QueryExecutionError>;
}

pub struct SqliteQueryExecutor {
    pool: DbPool,
}

impl SqliteQueryExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for SqliteQueryExecutor {
    async fn execute(&self, query_text: &str) -> Result<Vec<ResultRow>, QueryExecutionError> {
        let sql = strip_code_fences(query_text);
        if sql.is_empty() {
            return Err(QueryExecutionError::EmptyQuery);
        }

        tracing::debug!(query = %sql, "executing generated query");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_json).collect()
    }
}

/// Model replies often arrive wrapped in Markdown fences. Unwrap them before
/// handing the text to SQLite.
pub fn strip_code_fences(text: &str) -> String {
    let mut trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```sql") {
        trimmed = rest;
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        trimmed = rest;
    }
    if let Some(rest) = trimmed.strip_suffix("```") {
        trimmed = rest;
    }
    trimmed.trim().to_string()
}

fn row_to_json(row: &SqliteRow) -> Result<ResultRow, QueryExecutionError> {
    let mut object = ResultRow::new();
    for column in row.columns() {
        let name = column.name().to_string();
        let value = column_to_json(row, column.ordinal(), &name)?;
        object.insert(name, value);
    }
    Ok(object)
}

fn column_to_json(
    row: &SqliteRow,
    ordinal: usize,
    column: &str,
) -> Result<Value, QueryExecutionError> {
    let raw = row.try_get_raw(ordinal).map_err(|error| QueryExecutionError::Decode {
        column: column.to_string(),
        message: error.to_string(),
    })?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_info = raw.type_info();
    let decoded = match type_info.name() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(ordinal).map(Value::from),
        "REAL" | "NUMERIC" => row.try_get::<f64, _>(ordinal).map(|value| {
            serde_json::Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
        }),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(ordinal)
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        _ => row.try_get::<String, _>(ordinal).map(Value::String),
    };

    decoded.map_err(|error| QueryExecutionError::Decode {
        column: column.to_string(),
        message: error.to_string(),
    })
}
