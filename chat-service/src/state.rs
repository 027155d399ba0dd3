//! Application state for chat service.

use std::sync::Arc;

use common::config::AppConfig;
use tokio::sync::Mutex;

use crate::llm::LlmClient;
use crate::session::Session;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// One session; the lock serializes connect, ask and test actions.
    pub session: Arc<Mutex<Session>>,
    pub llm: Arc<dyn LlmClient>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(config.chat_history_limit))),
            llm,
            config,
        }
    }
}
