//! Database connector.
//!
//! Turns a validated [`ConnectionProfile`] into a live `sqlx` pool for one of
//! the three supported engines.

use std::time::{Duration, Instant};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::connection::{ConnectionProfile, DbEngine};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions};
use sqlx::{MySqlPool, PgPool, SqlitePool};

/// Base tables reachable unqualified through the PostgreSQL `search_path`.
///
/// A name present in several schemas resolves to the earliest one, so only
/// that copy is kept.
pub(crate) const PG_VISIBLE_TABLES: &str = "\
    SELECT DISTINCT ON (table_name) table_schema::text AS table_schema, table_name::text AS table_name \
    FROM information_schema.tables \
    WHERE table_schema::name = ANY (current_schemas(false)) AND table_type = 'BASE TABLE' \
    ORDER BY table_name, array_position(current_schemas(false), table_schema::name)";

/// Connection pool wrapper for the supported engines.
#[derive(Clone, Debug)]
pub enum DatabasePool {
    /// PostgreSQL connection pool.
    Postgres(PgPool),
    /// MySQL connection pool.
    MySql(MySqlPool),
    /// SQLite connection pool (single read-only connection).
    Sqlite(SqlitePool),
}

impl DatabasePool {
    /// Opens a pool for `profile`.
    ///
    /// SQLite files are opened read-only and must already exist.
    pub async fn connect(profile: &ConnectionProfile, config: &AppConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        let pool = match profile.engine {
            DbEngine::Postgres => {
                let url = profile.connection_url()?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(timeout)
                    .connect(&url)
                    .await
                    .map_err(connection_error)?;
                DatabasePool::Postgres(pool)
            }
            DbEngine::MySql => {
                let url = profile.connection_url()?;
                let pool = MySqlPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(timeout)
                    .connect(&url)
                    .await
                    .map_err(connection_error)?;
                DatabasePool::MySql(pool)
            }
            DbEngine::Sqlite => {
                let options = SqliteConnectOptions::new()
                    .filename(&profile.database)
                    .read_only(true)
                    .create_if_missing(false);
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await
                    .map_err(connection_error)?;
                DatabasePool::Sqlite(pool)
            }
        };

        tracing::info!(url = %profile.redacted_url(), "database connected");
        Ok(pool)
    }

    /// Engine behind this pool.
    pub fn engine(&self) -> DbEngine {
        match self {
            DatabasePool::Postgres(_) => DbEngine::Postgres,
            DatabasePool::MySql(_) => DbEngine::MySql,
            DatabasePool::Sqlite(_) => DbEngine::Sqlite,
        }
    }

    /// Runs `SELECT 1` and returns the round-trip time.
    pub async fn ping(&self) -> AppResult<Duration> {
        let start = Instant::now();
        match self {
            DatabasePool::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await.map_err(connection_error)?;
            }
            DatabasePool::MySql(pool) => {
                sqlx::query("SELECT 1").execute(pool).await.map_err(connection_error)?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await.map_err(connection_error)?;
            }
        }
        Ok(start.elapsed())
    }

    /// Lists usable (base) table names, sorted.
    pub async fn table_names(&self) -> AppResult<Vec<String>> {
        let names = match self {
            DatabasePool::Postgres(pool) => {
                let sql = format!(
                    "WITH visible AS ({PG_VISIBLE_TABLES}) SELECT table_name FROM visible ORDER BY table_name"
                );
                sqlx::query_scalar::<_, String>(&sql).fetch_all(pool).await
            }
            DatabasePool::MySql(pool) => {
                sqlx::query_scalar::<_, String>(
                    "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES
                     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
                     ORDER BY TABLE_NAME",
                )
                .fetch_all(pool)
                .await
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_scalar::<_, String>(
                    "SELECT name FROM sqlite_master
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                     ORDER BY name",
                )
                .fetch_all(pool)
                .await
            }
        };
        names.map_err(|e| AppError::DatabaseQuery(e.to_string()))
    }

    /// Closes every connection in the pool.
    pub async fn close(&self) {
        match self {
            DatabasePool::Postgres(pool) => pool.close().await,
            DatabasePool::MySql(pool) => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }
}

fn connection_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseConnection(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use common::models::ConnectForm;

    fn sqlite_profile(path: &str) -> ConnectionProfile {
        ConnectForm {
            engine: DbEngine::Sqlite,
            host: None,
            port: None,
            username: None,
            password: None,
            database: path.to_string(),
            api_key: None,
        }
        .into_profile()
        .unwrap()
    }

    #[tokio::test]
    async fn test_connect_seeded_sqlite_lists_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.db");
        demo::seed_demo_database(path.to_str().unwrap()).await.unwrap();

        let pool = DatabasePool::connect(&sqlite_profile(path.to_str().unwrap()), &AppConfig::default())
            .await
            .unwrap();
        assert_eq!(pool.engine(), DbEngine::Sqlite);
        assert_eq!(
            pool.table_names().await.unwrap(),
            vec!["customers", "orders", "products"]
        );
        assert!(pool.ping().await.is_ok());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_missing_sqlite_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let err = DatabasePool::connect(&sqlite_profile(path.to_str().unwrap()), &AppConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseConnection(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_pg_tables_cover_search_path() {
        assert!(PG_VISIBLE_TABLES.contains("ANY (current_schemas(false))"));
        assert!(PG_VISIBLE_TABLES.contains("DISTINCT ON (table_name)"));
        assert!(!PG_VISIBLE_TABLES.contains("current_schema()"));
    }
}
