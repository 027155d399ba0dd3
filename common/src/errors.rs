//! Application error type.
//!
//! Every failure surfaced to the user maps to one variant here and renders
//! as a one-line message inside the standard [`ApiResponse`] envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Errors produced by the chatbot.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body or form field failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// No database is connected for this session.
    #[error("no database connected")]
    NotConnected,

    /// The database could not be reached or rejected the credentials.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// The database rejected or failed to run a statement.
    #[error("query execution failed: {0}")]
    DatabaseQuery(String),

    /// The statement is not a read-only query.
    #[error("unsafe SQL rejected: {0}")]
    UnsafeSql(String),

    /// The LLM endpoint failed or returned an unusable reply.
    #[error("LLM request failed: {0}")]
    LlmService(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotConnected => "NOT_CONNECTED",
            AppError::DatabaseConnection(_) => "DB_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DB_QUERY_ERROR",
            AppError::UnsafeSql(_) => "UNSAFE_SQL",
            AppError::LlmService(_) => "LLM_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotConnected => StatusCode::CONFLICT,
            AppError::DatabaseConnection(_) | AppError::LlmService(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseQuery(_) | AppError::UnsafeSql(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string().replace('\n', "; "))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
