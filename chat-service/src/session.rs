//! 会话状态
//!
//! A single user session: the live connection (if any) and the chat history.

use common::errors::AppResult;
use common::models::chat::ChatHistory;
use common::models::connection::{ConnectionProfile, ConnectionSummary, SessionStatus};
use common::models::schema::SchemaSnapshot;

use crate::connector::DatabasePool;
use crate::schema;

/// The connected database and everything derived from it.
pub struct ActiveConnection {
    pub profile: ConnectionProfile,
    pub pool: DatabasePool,
    /// LLM key supplied with the connect form.
    pub api_key: String,
    pub summary: ConnectionSummary,
    /// Captured on first use and dropped with the connection.
    pub schema: Option<SchemaSnapshot>,
}

impl ActiveConnection {
    /// Returns the schema snapshot, capturing it on first use.
    pub async fn schema(&mut self, sample_rows: usize) -> AppResult<&SchemaSnapshot> {
        let snapshot = match self.schema.take() {
            Some(snapshot) => snapshot,
            None => schema::capture(&self.pool, sample_rows).await?,
        };
        Ok(self.schema.insert(snapshot))
    }
}

/// Per-user session state.
pub struct Session {
    pub active: Option<ActiveConnection>,
    pub history: ChatHistory,
}

impl Session {
    pub fn new(history_limit: usize) -> Self {
        Self {
            active: None,
            history: ChatHistory::new(history_limit),
        }
    }

    /// Replaces the active connection, closing the previous one.
    ///
    /// The chat history belongs to the old database and is cleared.
    pub async fn replace(&mut self, next: ActiveConnection) {
        self.close().await;
        self.active = Some(next);
    }

    /// Closes the active connection and clears the history.
    ///
    /// Returns whether a connection was open.
    pub async fn close(&mut self) -> bool {
        self.history.clear();
        match self.active.take() {
            Some(active) => {
                active.pool.close().await;
                tracing::info!(url = %active.profile.redacted_url(), "database disconnected");
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            connected: self.active.is_some(),
            connection: self.active.as_ref().map(|a| a.summary.clone()),
            schema_cached: self.active.as_ref().is_some_and(|a| a.schema.is_some()),
            history_len: self.history.len(),
        }
    }
}
