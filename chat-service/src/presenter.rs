//! Result narration.

use common::models::query::QueryResult;

use crate::llm::{CompletionRequest, LlmClient};

/// Rows included in the narration prompt.
pub const NARRATION_MAX_ROWS: usize = 50;

const SYSTEM_PROMPT: &str = "You are a helpful data analyst. Given a user's question, the SQL query used, \
and the results, provide a clear, concise explanation of what the results mean in natural language.

Rules:
1. Be conversational and easy to understand
2. Mention key numbers/findings from the results
3. Keep it brief but informative
4. If there are no results, explain why that might be";

/// Builds the user message for the narration call.
pub fn build_prompt(question: &str, sql: &str, result: &QueryResult) -> String {
    let results = if result.is_empty() {
        "No results".to_string()
    } else {
        result.to_text_table(NARRATION_MAX_ROWS)
    };
    format!(
        "Question: {}\nSQL Query: {}\nResults:\n{}\n\nPlease explain what these results mean.",
        question, sql, results
    )
}

/// Asks the model to explain `result`.
///
/// Returns `None` when the call fails; the rows are still worth showing.
pub async fn narrate(
    llm: &dyn LlmClient,
    api_key: &str,
    question: &str,
    sql: &str,
    result: &QueryResult,
) -> Option<String> {
    let user = build_prompt(question, sql, result);
    match llm
        .complete(CompletionRequest {
            api_key,
            system: SYSTEM_PROMPT,
            user: &user,
        })
        .await
    {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(error = %e, "narration failed, returning raw rows");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use common::models::query::ColumnInfo;
    use serde_json::json;

    fn count_result() -> QueryResult {
        QueryResult {
            columns: vec![ColumnInfo {
                name: "total".into(),
                data_type: "INTEGER".into(),
            }],
            rows: vec![vec![json!(5)]],
            row_count: 1,
            truncated: false,
            execution_time_ms: 1,
        }
    }

    #[test]
    fn test_prompt_contains_table() {
        let prompt = build_prompt("How many?", "SELECT COUNT(*) AS total FROM customers", &count_result());
        assert!(prompt.contains("Question: How many?"));
        assert!(prompt.contains("SQL Query: SELECT COUNT(*)"));
        assert!(prompt.contains("total\n5"));
    }

    #[test]
    fn test_prompt_for_empty_result() {
        let prompt = build_prompt("Any?", "SELECT 1 WHERE 1 = 0", &QueryResult::empty());
        assert!(prompt.contains("Results:\nNo results"));
    }

    #[tokio::test]
    async fn test_narrate_returns_reply() {
        let llm = ScriptedLlm::new().reply("There are 5 customers.");
        let text = narrate(&llm, "k", "How many?", "SELECT 1", &count_result()).await;
        assert_eq!(text.as_deref(), Some("There are 5 customers."));
        assert_eq!(llm.prompts()[0].system, SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_narrate_failure_is_none() {
        let llm = ScriptedLlm::new().fail("rate limited");
        assert!(narrate(&llm, "k", "q", "SELECT 1", &count_result()).await.is_none());
    }
}
