//! Read-only query execution.
//!
//! Statements reaching this module have already passed
//! [`SqlGuard`](common::utils::SqlGuard). Execution adds a second layer:
//! PostgreSQL and MySQL run inside a read-only transaction that is always
//! rolled back, and SQLite pools are opened read-only by the connector.

use std::time::Instant;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::query::{ColumnInfo, QueryResult};
use futures_util::TryStreamExt;
use serde_json::{Number, Value};
use sqlx::mysql::{MySqlConnection, MySqlPool, MySqlRow};
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::types::BigDecimal;
use sqlx::{Column, ColumnIndex, Connection, Decode, Executor, Row, Type, TypeInfo};

use crate::connector::DatabasePool;

#[derive(Default)]
struct Collected {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    truncated: bool,
}

impl Collected {
    /// Adds `row`, returning false once `limit` rows are already held.
    fn push<R: Row>(&mut self, row: &R, limit: usize, decode: fn(&R, usize) -> Value) -> bool {
        if self.columns.is_empty() {
            self.columns = row
                .columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name().to_string(),
                    data_type: c.type_info().name().to_string(),
                })
                .collect();
        }
        if self.rows.len() >= limit {
            self.truncated = true;
            return false;
        }
        self.rows.push((0..row.len()).map(|i| decode(row, i)).collect());
        true
    }
}

/// Runs `sql` and returns at most `limit` rows.
pub async fn fetch_read_only(
    pool: &DatabasePool,
    sql: &str,
    limit: usize,
) -> AppResult<QueryResult> {
    let start = Instant::now();

    let collected = match pool {
        DatabasePool::Postgres(pool) => run_pg(pool, sql, limit).await,
        DatabasePool::MySql(pool) => run_mysql(pool, sql, limit).await,
        DatabasePool::Sqlite(pool) => run_sqlite(pool, sql, limit).await,
    }
    .map_err(query_error)?;

    let execution_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        rows = collected.rows.len(),
        truncated = collected.truncated,
        execution_time_ms,
        "query executed"
    );

    Ok(QueryResult {
        row_count: collected.rows.len(),
        columns: collected.columns,
        rows: collected.rows,
        truncated: collected.truncated,
        execution_time_ms,
    })
}

fn query_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(db) => AppError::DatabaseQuery(db.message().to_string()),
        other => AppError::DatabaseQuery(other.to_string()),
    }
}

async fn run_pg(pool: &PgPool, sql: &str, limit: usize) -> Result<Collected, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let collected = collect_pg(&mut tx, sql, limit).await;
    tx.rollback().await?;
    collected
}

async fn collect_pg(
    conn: &mut PgConnection,
    sql: &str,
    limit: usize,
) -> Result<Collected, sqlx::Error> {
    (&mut *conn)
        .execute(sqlx::raw_sql("SET TRANSACTION READ ONLY"))
        .await?;

    let mut out = Collected::default();
    let mut rows = sqlx::query(sql).fetch(&mut *conn);
    while let Some(row) = rows.try_next().await? {
        if !out.push(&row, limit, decode_pg) {
            break;
        }
    }
    Ok(out)
}

async fn run_mysql(pool: &MySqlPool, sql: &str, limit: usize) -> Result<Collected, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    // applies to the next transaction on this connection
    (&mut *conn)
        .execute(sqlx::raw_sql("SET TRANSACTION READ ONLY"))
        .await?;
    let mut tx = conn.begin().await?;
    let collected = collect_mysql(&mut tx, sql, limit).await;
    tx.rollback().await?;
    collected
}

async fn collect_mysql(
    conn: &mut MySqlConnection,
    sql: &str,
    limit: usize,
) -> Result<Collected, sqlx::Error> {
    let mut out = Collected::default();
    let mut rows = sqlx::query(sql).fetch(&mut *conn);
    while let Some(row) = rows.try_next().await? {
        if !out.push(&row, limit, decode_mysql) {
            break;
        }
    }
    Ok(out)
}

async fn run_sqlite(pool: &SqlitePool, sql: &str, limit: usize) -> Result<Collected, sqlx::Error> {
    let mut out = Collected::default();
    let mut rows = sqlx::query(sql).fetch(pool);
    while let Some(row) = rows.try_next().await? {
        if !out.push(&row, limit, decode_sqlite) {
            break;
        }
    }
    Ok(out)
}

fn decode_pg(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(idx) {
        return v.map(decimal_to_json).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    decode_common(row, idx)
}

fn decode_mysql(row: &MySqlRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(idx) {
        return v.map(decimal_to_json).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    decode_common(row, idx)
}

fn decode_sqlite(row: &SqliteRow, idx: usize) -> Value {
    decode_common(row, idx)
}

macro_rules! try_decode {
    ($row:expr, $idx:expr, $ty:ty, $map:expr) => {
        if let Ok(v) = $row.try_get::<Option<$ty>, _>($idx) {
            return v.map($map).unwrap_or(Value::Null);
        }
    };
}

/// Decodes the types every supported driver understands.
///
/// Integers are tried before booleans because SQLite reports booleans as
/// integers; anything left over renders as `<type name>`.
fn decode_common<'r, R>(row: &'r R, idx: usize) -> Value
where
    R: Row,
    usize: ColumnIndex<R>,
    i64: Type<R::Database> + Decode<'r, R::Database>,
    i32: Type<R::Database> + Decode<'r, R::Database>,
    i16: Type<R::Database> + Decode<'r, R::Database>,
    f64: Type<R::Database> + Decode<'r, R::Database>,
    f32: Type<R::Database> + Decode<'r, R::Database>,
    bool: Type<R::Database> + Decode<'r, R::Database>,
    String: Type<R::Database> + Decode<'r, R::Database>,
    NaiveDateTime: Type<R::Database> + Decode<'r, R::Database>,
    DateTime<Utc>: Type<R::Database> + Decode<'r, R::Database>,
    NaiveDate: Type<R::Database> + Decode<'r, R::Database>,
    NaiveTime: Type<R::Database> + Decode<'r, R::Database>,
    Vec<u8>: Type<R::Database> + Decode<'r, R::Database>,
{
    try_decode!(row, idx, i64, Value::from);
    try_decode!(row, idx, i32, Value::from);
    try_decode!(row, idx, i16, Value::from);
    try_decode!(row, idx, f64, float_to_json);
    try_decode!(row, idx, f32, |v: f32| float_to_json(f64::from(v)));
    try_decode!(row, idx, bool, Value::Bool);
    try_decode!(row, idx, String, Value::String);
    try_decode!(row, idx, NaiveDateTime, |v: NaiveDateTime| Value::String(
        v.format("%Y-%m-%d %H:%M:%S").to_string()
    ));
    try_decode!(row, idx, DateTime<Utc>, |v: DateTime<Utc>| Value::String(v.to_rfc3339()));
    try_decode!(row, idx, NaiveDate, |v: NaiveDate| Value::String(v.to_string()));
    try_decode!(row, idx, NaiveTime, |v: NaiveTime| Value::String(v.to_string()));
    try_decode!(row, idx, Vec<u8>, |v: Vec<u8>| Value::String(format!(
        "<{} bytes>",
        v.len()
    )));

    Value::String(format!("<{}>", row.column(idx).type_info().name()))
}

fn float_to_json(v: f64) -> Value {
    Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

fn decimal_to_json(d: BigDecimal) -> Value {
    let text = d.to_string();
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    match text.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(text),
    }
}
