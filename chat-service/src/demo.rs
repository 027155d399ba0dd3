//! Demo SQLite database seeding.

use common::errors::{AppError, AppResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Seed script with the `customers`, `products` and `orders` tables.
pub const DEMO_SEED_SQL: &str = include_str!("../seed/demo.sql");

/// Creates and seeds the demo database at `path`.
///
/// Does nothing when the file already has a `customers` table. Returns
/// whether the seed script ran.
pub async fn seed_demo_database(path: &str) -> AppResult<bool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'customers'",
    )
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;

    let seeded = if existing == 0 {
        sqlx::raw_sql(DEMO_SEED_SQL)
            .execute(&pool)
            .await
            .map_err(|e| AppError::DatabaseQuery(format!("failed to seed demo database: {}", e)))?;
        tracing::info!(path, "demo database seeded");
        true
    } else {
        tracing::debug!(path, "demo database already present");
        false
    };

    pool.close().await;
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.db");
        let path = path.to_str().unwrap();

        assert!(seed_demo_database(path).await.unwrap());
        assert!(!seed_demo_database(path).await.unwrap());

        let pool = SqlitePoolOptions::new()
            .connect_with(SqliteConnectOptions::new().filename(path))
            .await
            .unwrap();
        let customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(customers, 5);
    }
}
