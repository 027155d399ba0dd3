//! SQL query result models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result of a SQL query execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    /// Column information.
    pub columns: Vec<ColumnInfo>,

    /// Row data (each row is a vector of JSON values).
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Number of rows returned.
    pub row_count: usize,

    /// Whether rows were dropped because of the row limit.
    #[serde(default)]
    pub truncated: bool,

    /// Query execution time in milliseconds.
    #[serde(default)]
    pub execution_time_ms: u64,
}

/// Column information in query result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Driver type name.
    pub data_type: String,
}

impl QueryResult {
    /// Creates a new empty query result.
    pub fn empty() -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            row_count: 0,
            truncated: false,
            execution_time_ms: 0,
        }
    }

    /// Whether the query returned no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renders up to `max_rows` rows as tab-separated lines with a header.
    pub fn to_tsv(&self, max_rows: usize) -> String {
        let mut out = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join("\t");
        for row in self.rows.iter().take(max_rows) {
            out.push('\n');
            out.push_str(
                &row.iter()
                    .map(display_value)
                    .collect::<Vec<_>>()
                    .join("\t"),
            );
        }
        out
    }

    /// Renders up to `max_rows` rows as an aligned plain-text table.
    pub fn to_text_table(&self, max_rows: usize) -> String {
        let header: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(max_rows)
            .map(|row| row.iter().map(display_value).collect())
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for row in &body {
            for (i, cell) in row.iter().enumerate() {
                let len = cell.chars().count();
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(len),
                    None => widths.push(len),
                }
            }
        }

        let render = |cells: &[String]| {
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut lines = vec![render(&header)];
        lines.extend(body.iter().map(|row| render(row)));
        let hidden = self.rows.len().saturating_sub(max_rows);
        if hidden > 0 || self.truncated {
            lines.push(format!(
                "... ({} of {}{} rows shown)",
                self.rows.len().min(max_rows),
                self.row_count,
                if self.truncated { "+" } else { "" }
            ));
        }
        lines.join("\n")
    }
}

/// Formats a cell for plain-text output.
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec![
                ColumnInfo { name: "name".into(), data_type: "TEXT".into() },
                ColumnInfo { name: "total".into(), data_type: "REAL".into() },
            ],
            rows: vec![
                vec![json!("Alice"), json!(120.5)],
                vec![json!("Bob"), serde_json::Value::Null],
            ],
            row_count: 2,
            truncated: false,
            execution_time_ms: 1,
        }
    }

    #[test]
    fn test_tsv_has_header_and_rows() {
        assert_eq!(sample().to_tsv(10), "name\ttotal\nAlice\t120.5\nBob\tNULL");
        assert_eq!(sample().to_tsv(1), "name\ttotal\nAlice\t120.5");
    }

    #[test]
    fn test_text_table_is_aligned() {
        let table = sample().to_text_table(10);
        assert_eq!(table, "name   total\nAlice  120.5\nBob    NULL");
    }

    #[test]
    fn test_text_table_notes_hidden_rows() {
        let table = sample().to_text_table(1);
        assert!(table.ends_with("... (1 of 2 rows shown)"));
    }
}
