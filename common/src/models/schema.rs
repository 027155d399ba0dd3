//! Schema snapshot models.
//!
//! A snapshot is captured once per connection and rendered into the prompt
//! the LLM sees.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::connection::DbEngine;
use super::query::QueryResult;

/// One column of a table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub data_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// One table with its columns and a few sample rows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSchema>,
    /// Sample rows, when they could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<QueryResult>,
}

/// Cached description of the connected database.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchemaSnapshot {
    /// Engine the snapshot was taken from.
    pub engine: DbEngine,
    /// Tables sorted by name.
    pub tables: Vec<TableSchema>,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
}

impl TableSchema {
    /// Renders the table as a `CREATE TABLE` block followed by its sample rows.
    pub fn render(&self, engine: DbEngine) -> String {
        let mut columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("\t{} {}", c.name, c.data_type);
                if !c.nullable {
                    line.push_str(" NOT NULL");
                }
                line
            })
            .collect();

        let keys: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        if !keys.is_empty() {
            columns.push(format!("\tPRIMARY KEY ({})", keys.join(", ")));
        }

        let mut out = format!(
            "CREATE TABLE {} (\n{}\n)",
            engine.quote_ident(&self.name),
            columns.join(",\n")
        );

        if let Some(sample) = self.sample.as_ref().filter(|s| !s.is_empty()) {
            out.push_str(&format!(
                "\n\n/*\n{} rows from {} table:\n{}\n*/",
                sample.rows.len(),
                self.name,
                sample.to_tsv(sample.rows.len())
            ));
        }
        out
    }
}

impl SchemaSnapshot {
    /// Creates a snapshot captured now.
    pub fn new(engine: DbEngine, mut tables: Vec<TableSchema>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            engine,
            tables,
            captured_at: Utc::now(),
        }
    }

    /// Table names in order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Renders every table for the LLM prompt.
    pub fn render_for_prompt(&self) -> String {
        if self.tables.is_empty() {
            return "(the database has no tables)".to_string();
        }
        self.tables
            .iter()
            .map(|t| t.render(self.engine))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::ColumnInfo;
    use serde_json::json;

    fn column(name: &str, data_type: &str, nullable: bool, primary_key: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            primary_key,
        }
    }

    fn customers() -> TableSchema {
        TableSchema {
            name: "customers".into(),
            columns: vec![
                column("id", "INTEGER", false, true),
                column("name", "TEXT", false, false),
                column("email", "TEXT", true, false),
            ],
            sample: None,
        }
    }

    #[test]
    fn test_render_create_table() {
        let rendered = customers().render(DbEngine::Sqlite);
        assert_eq!(
            rendered,
            "CREATE TABLE \"customers\" (\n\tid INTEGER NOT NULL,\n\tname TEXT NOT NULL,\n\temail TEXT,\n\tPRIMARY KEY (id)\n)"
        );
    }

    #[test]
    fn test_render_includes_sample_rows() {
        let mut table = customers();
        table.sample = Some(QueryResult {
            columns: vec![
                ColumnInfo { name: "id".into(), data_type: "INTEGER".into() },
                ColumnInfo { name: "name".into(), data_type: "TEXT".into() },
            ],
            rows: vec![vec![json!(1), json!("Alice")]],
            row_count: 1,
            truncated: false,
            execution_time_ms: 0,
        });
        let rendered = table.render(DbEngine::MySql);
        assert!(rendered.starts_with("CREATE TABLE `customers`"));
        assert!(rendered.contains("1 rows from customers table:\nid\tname\n1\tAlice"));
    }

    #[test]
    fn test_snapshot_sorts_tables() {
        let mut orders = customers();
        orders.name = "orders".into();
        let snapshot = SchemaSnapshot::new(DbEngine::Sqlite, vec![orders, customers()]);
        assert_eq!(snapshot.table_names(), vec!["customers", "orders"]);
        assert!(snapshot.render_for_prompt().contains("CREATE TABLE \"orders\""));
    }

    #[test]
    fn test_empty_snapshot_renders_placeholder() {
        let snapshot = SchemaSnapshot::new(DbEngine::Postgres, vec![]);
        assert_eq!(snapshot.render_for_prompt(), "(the database has no tables)");
    }
}
