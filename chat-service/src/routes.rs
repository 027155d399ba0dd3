//! 聊天服务路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;
use crate::ui;

/// 创建页面与 API 路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(ui::index))
        .route("/api/health", get(handlers::health_check))
        .route("/api/session", get(handlers::session_status))
        .route("/api/session/connect", post(handlers::connect))
        .route("/api/session/disconnect", post(handlers::disconnect))
        .route("/api/session/schema", get(handlers::schema))
        .route("/api/session/test", get(handlers::test_connection))
        .route("/api/chat", post(handlers::ask))
        .route(
            "/api/chat/history",
            get(handlers::history).delete(handlers::clear_history),
        )
}
