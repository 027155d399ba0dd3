//! Schema introspection.
//!
//! Builds the [`SchemaSnapshot`] handed to the LLM: every base table with
//! its columns, plus a few sample rows per table.

use common::errors::{AppError, AppResult};
use common::models::schema::{ColumnSchema, SchemaSnapshot, TableSchema};

use crate::connector::{DatabasePool, PG_VISIBLE_TABLES};
use crate::executor;

/// (table, column, type, nullable, primary key)
type ColumnRow = (String, String, String, bool, bool);

/// Captures a snapshot of the connected database.
///
/// Sample rows are best effort; a table whose rows cannot be read is still
/// described by its columns.
pub async fn capture(pool: &DatabasePool, sample_rows: usize) -> AppResult<SchemaSnapshot> {
    let rows = column_rows(pool).await?;

    let mut tables: Vec<TableSchema> = Vec::new();
    for (table, column, data_type, nullable, primary_key) in rows {
        let column = ColumnSchema {
            name: column,
            data_type,
            nullable,
            primary_key,
        };
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => tables.push(TableSchema {
                name: table,
                columns: vec![column],
                sample: None,
            }),
        }
    }

    if sample_rows > 0 {
        let engine = pool.engine();
        for table in &mut tables {
            let sql = format!(
                "SELECT * FROM {} LIMIT {}",
                engine.quote_ident(&table.name),
                sample_rows
            );
            match executor::fetch_read_only(pool, &sql, sample_rows).await {
                Ok(sample) => table.sample = Some(sample),
                Err(e) => {
                    tracing::warn!(table = %table.name, error = %e, "could not read sample rows")
                }
            }
        }
    }

    let snapshot = SchemaSnapshot::new(pool.engine(), tables);
    tracing::info!(tables = snapshot.tables.len(), "schema snapshot captured");
    Ok(snapshot)
}

async fn column_rows(pool: &DatabasePool) -> AppResult<Vec<ColumnRow>> {
    let rows = match pool {
        DatabasePool::Postgres(pool) => {
            let sql = format!(
                "WITH visible AS ({PG_VISIBLE_TABLES})
                 SELECT c.table_name::text,
                        c.column_name::text,
                        c.data_type::text,
                        (c.is_nullable = 'YES') AS nullable,
                        EXISTS (
                            SELECT 1
                            FROM information_schema.table_constraints tc
                            JOIN information_schema.key_column_usage k
                              ON k.constraint_name = tc.constraint_name
                             AND k.table_schema = tc.table_schema
                             AND k.table_name = tc.table_name
                            WHERE tc.constraint_type = 'PRIMARY KEY'
                              AND tc.table_schema = c.table_schema
                              AND tc.table_name = c.table_name
                              AND k.column_name = c.column_name
                        ) AS primary_key
                 FROM information_schema.columns c
                 JOIN visible v
                   ON v.table_schema = c.table_schema::text
                  AND v.table_name = c.table_name::text
                 ORDER BY c.table_name, c.ordinal_position"
            );
            sqlx::query_as::<_, ColumnRow>(&sql)
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::DatabaseQuery(e.to_string()))?
        }
        DatabasePool::MySql(pool) => {
            let raw = sqlx::query_as::<_, (String, String, String, String, String)>(
                "SELECT CAST(c.TABLE_NAME AS CHAR),
                        CAST(c.COLUMN_NAME AS CHAR),
                        CAST(c.COLUMN_TYPE AS CHAR),
                        CAST(c.IS_NULLABLE AS CHAR),
                        CAST(c.COLUMN_KEY AS CHAR)
                 FROM information_schema.COLUMNS c
                 JOIN information_schema.TABLES t
                   ON t.TABLE_SCHEMA = c.TABLE_SCHEMA
                  AND t.TABLE_NAME = c.TABLE_NAME
                  AND t.TABLE_TYPE = 'BASE TABLE'
                 WHERE c.TABLE_SCHEMA = DATABASE()
                 ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION",
            )
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
            raw.into_iter()
                .map(|(table, column, data_type, nullable, key)| {
                    (table, column, data_type, nullable == "YES", key == "PRI")
                })
                .collect()
        }
        DatabasePool::Sqlite(sqlite) => {
            let mut rows = Vec::new();
            for table in pool.table_names().await? {
                let columns = sqlx::query_as::<_, (String, String, i64, i64)>(
                    "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?) ORDER BY cid",
                )
                .bind(&table)
                .fetch_all(sqlite)
                .await
                .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
                rows.extend(columns.into_iter().map(|(name, data_type, not_null, pk)| {
                    // primary keys are reported as non-null
                    (table.clone(), name, data_type, not_null == 0 && pk == 0, pk > 0)
                }));
            }
            rows
        }
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use common::config::AppConfig;
    use common::models::{ConnectForm, DbEngine};

    async fn demo_pool(dir: &tempfile::TempDir) -> DatabasePool {
        let path = dir.path().join("demo.db");
        let path = path.to_str().unwrap().to_string();
        demo::seed_demo_database(&path).await.unwrap();
        let profile = ConnectForm {
            engine: DbEngine::Sqlite,
            host: None,
            port: None,
            username: None,
            password: None,
            database: path,
            api_key: None,
        }
        .into_profile()
        .unwrap();
        DatabasePool::connect(&profile, &AppConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_capture_demo_schema() {
        let dir = tempfile::tempdir().unwrap();
        let pool = demo_pool(&dir).await;
        let snapshot = capture(&pool, 3).await.unwrap();

        assert_eq!(snapshot.engine, DbEngine::Sqlite);
        assert_eq!(snapshot.table_names(), vec!["customers", "orders", "products"]);

        let customers = &snapshot.tables[0];
        let names: Vec<&str> = customers.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email", "city", "created_at"]);
        assert!(customers.columns[0].primary_key);
        assert!(!customers.columns[1].nullable);
        assert!(customers.columns[3].nullable);
        assert_eq!(customers.sample.as_ref().unwrap().row_count, 3);

        let rendered = snapshot.render_for_prompt();
        assert!(rendered.contains("CREATE TABLE \"customers\""));
        assert!(rendered.contains("3 rows from orders table:"));
    }

    #[tokio::test]
    async fn test_capture_without_samples() {
        let dir = tempfile::tempdir().unwrap();
        let pool = demo_pool(&dir).await;
        let snapshot = capture(&pool, 0).await.unwrap();
        assert!(snapshot.tables.iter().all(|t| t.sample.is_none()));
    }
}
