//! Natural-language to SQL translation.

use chrono::{Local, NaiveDate};
use common::errors::AppResult;
use common::models::schema::SchemaSnapshot;

use crate::llm::{CompletionRequest, LlmClient};

/// Builds the system prompt for SQL generation.
pub fn build_prompt(snapshot: &SchemaSnapshot, today: NaiveDate) -> String {
    let dialect = snapshot.engine.dialect();
    format!(
        "You are a {dialect} expert. Given a database schema and a user question, \
write a single {dialect} query that answers the question.

Current date: {today}
Database type: {dialect}
Database Schema:
{schema}

Rules:
1. Only return the SQL query, nothing else
2. Use proper {dialect} syntax
3. Don't include any explanations or markdown
4. Only read data: write a single SELECT (or WITH ... SELECT) statement
5. Use table and column names exactly as they appear in the schema
6. For date/time questions:
   - Use the {dialect} date functions
   - For \"this month\": use the current month and year
   - For \"today\": use the current date
   - For relative dates, calculate from the current date
7. Handle case-insensitive searches appropriately
8. Use proper JOIN syntax when multiple tables are involved",
        today = today.format("%Y-%m-%d"),
        schema = snapshot.render_for_prompt(),
    )
}

/// Pulls the SQL statement out of a model reply.
///
/// Accepts a ```` ```sql ```` fence, a bare fence, or a `SQLQuery:` marker;
/// anything else is taken as-is.
pub fn extract_sql(reply: &str) -> String {
    let mut text = reply.trim();

    if let Some(start) = find_ignore_case(text, "```sql") {
        text = fenced_body(&text[start + 6..]);
    } else if let Some(start) = text.find("```") {
        text = fenced_body(&text[start + 3..]);
    }

    if let Some(start) = text.find("SQLQuery:") {
        text = &text[start + "SQLQuery:".len()..];
        let end = text
            .find("SQLResult:")
            .or_else(|| text.find("Answer:"))
            .unwrap_or(text.len());
        text = &text[..end];
    }

    text.trim().to_string()
}

fn fenced_body(after_open: &str) -> &str {
    let end = after_open.find("```").unwrap_or(after_open.len());
    after_open[..end].trim()
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Asks the model for SQL answering `question`.
///
/// The returned statement has not been checked yet.
pub async fn translate(
    llm: &dyn LlmClient,
    api_key: &str,
    question: &str,
    snapshot: &SchemaSnapshot,
) -> AppResult<String> {
    let system = build_prompt(snapshot, Local::now().date_naive());
    let reply = llm
        .complete(CompletionRequest {
            api_key,
            system: &system,
            user: question,
        })
        .await?;
    let sql = extract_sql(&reply);
    tracing::debug!(%sql, "model produced SQL");
    Ok(sql)
}
