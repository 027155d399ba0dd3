//! Request, response and session models.

pub mod chat;
pub mod connection;
pub mod query;
pub mod schema;

pub use chat::{AskRequest, ChatHistory, ChatTurn};
pub use connection::{
    ConnectForm, ConnectionProfile, ConnectionSummary, ConnectionTestResult, DbEngine,
    SessionStatus,
};
pub use query::{ColumnInfo, QueryResult};
pub use schema::{ColumnSchema, SchemaSnapshot, TableSchema};
