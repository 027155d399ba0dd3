//! Chat turn and history models.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::query::QueryResult;
use crate::utils::IdGenerator;

/// Request body for asking a question.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AskRequest {
    /// Natural-language question.
    #[validate(length(min = 1, max = 2000, message = "Question must be 1-2000 characters"))]
    pub question: String,
}

/// One question and everything produced while answering it.
///
/// Turns are immutable once appended to the history.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatTurn {
    /// Turn identifier.
    pub id: String,
    /// The user's question.
    pub question: String,
    /// SQL produced by the model, as executed (or as rejected).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Query result when execution succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    /// Prose explanation of the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    /// One-line error when any step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    /// Starts a turn for `question`.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: IdGenerator::turn_id(),
            question: question.into(),
            sql: None,
            result: None,
            narration: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the turn ended with an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Rolling, ordered chat history.
#[derive(Debug)]
pub struct ChatHistory {
    turns: VecDeque<ChatTurn>,
    limit: usize,
}

impl ChatHistory {
    /// Creates a history keeping at most `limit` turns.
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Appends a turn, dropping the oldest beyond the limit.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.limit {
            self.turns.pop_front();
        }
    }

    /// Oldest-first copy of the turns.
    pub fn to_vec(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Number of turns held.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Removes every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_drops_oldest() {
        let mut history = ChatHistory::new(2);
        history.push(ChatTurn::new("first"));
        history.push(ChatTurn::new("second"));
        history.push(ChatTurn::new("third"));
        let questions: Vec<String> = history.to_vec().into_iter().map(|t| t.question).collect();
        assert_eq!(questions, vec!["second", "third"]);
    }

    #[test]
    fn test_clear_empties_history() {
        let mut history = ChatHistory::new(5);
        history.push(ChatTurn::new("q"));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_blank_question_fails_validation() {
        let req = AskRequest { question: String::new() };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_new_turn_has_no_outcome() {
        let turn = ChatTurn::new("How many customers are there?");
        assert!(!turn.is_error());
        assert!(turn.sql.is_none());
        let json = serde_json::to_value(&turn).unwrap();
        assert!(json.get("result").is_none());
    }
}
