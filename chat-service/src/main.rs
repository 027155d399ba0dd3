//! 自然语言转 SQL 聊天服务
//!
//! 提供以下功能：
//! - 连接 PostgreSQL / MySQL / SQLite 数据库
//! - 通过 LLM 将自然语言问题翻译为只读 SQL
//! - 执行查询并由 LLM 解读结果
//! - 单页聊天界面与会话历史

mod connector;
mod demo;
mod executor;
mod handlers;
mod llm;
mod presenter;
mod routes;
mod schema;
mod service;
mod session;
mod state;
mod translator;
mod ui;

use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id_middleware;
use llm::OpenAiCompatClient;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

const SERVICE_NAME: &str = "chat-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SQL 聊天机器人 API",
        version = "0.1.0",
        description = "自然语言转 SQL 查询服务"
    ),
    paths(
        handlers::connect,
        handlers::disconnect,
        handlers::session_status,
        handlers::schema,
        handlers::test_connection,
        handlers::ask,
        handlers::history,
        handlers::clear_history,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ConnectForm,
        common::models::ConnectionSummary,
        common::models::ConnectionTestResult,
        common::models::DbEngine,
        common::models::SessionStatus,
        common::models::AskRequest,
        common::models::ChatTurn,
        common::models::QueryResult,
        common::models::ColumnInfo,
        common::models::SchemaSnapshot,
        common::models::TableSchema,
        common::models::ColumnSchema,
        handlers::HealthResponse,
    )),
    tags(
        (name = "session", description = "数据库连接与会话端点"),
        (name = "chat", description = "问答端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

fn main() -> anyhow::Result<()> {
    // .env must be applied while the process is still single-threaded
    load_dotenv();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run())
}

async fn run() -> anyhow::Result<()> {
    // 加载配置并初始化日志追踪
    let config = AppConfig::load_with_service(SERVICE_NAME);
    common::logging::init(config.log_format);

    // 演示数据库
    if let Some(path) = &config.demo_db_path {
        demo::seed_demo_database(path)
            .await
            .with_context(|| format!("failed to prepare demo database at {}", path))?;
    }

    // 创建应用状态
    let llm = OpenAiCompatClient::new(&config.llm).context("failed to build LLM client")?;
    info!(endpoint = llm.url(), model = %config.llm.model, "LLM client ready");
    let state = AppState::new(config.clone(), Arc::new(llm));

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app).await.context("服务启动失败")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Load .env file from the working directory (best-effort, no error if missing).
///
/// Must run before the runtime starts any worker threads.
fn load_dotenv() {
    let Ok(content) = std::fs::read_to_string(".env") else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set by the environment
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_matches('"')))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv() {
        let content = "# LLM\nLLM_API_KEY = \"gsk_test\"\n\nPORT=3001\nnot a pair\n";
        assert_eq!(
            parse_dotenv(content),
            vec![("LLM_API_KEY", "gsk_test"), ("PORT", "3001")]
        );
    }
}
