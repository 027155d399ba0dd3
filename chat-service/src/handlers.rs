//! Handler模块

use std::convert::Infallible;
use std::time::Instant;

use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::chat::{AskRequest, ChatTurn};
use common::models::connection::{
    ConnectForm, ConnectionSummary, ConnectionTestResult, SessionStatus,
};
use common::models::schema::SchemaSnapshot;
use common::response::ApiResponse;

use crate::service::{ChatService, ChatServiceTrait};
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Request ID and start time, copied into the response metadata.
pub struct ReplyMeta {
    request_id: Option<String>,
    started: Instant,
}

impl<S: Send + Sync> FromRequestParts<S> for ReplyMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            request_id: parts.extensions.get::<RequestId>().map(|id| id.as_str().to_string()),
            started: Instant::now(),
        })
    }
}

fn ok<T: Serialize>(state: &AppState, meta: ReplyMeta, data: T) -> ApiResult<T> {
    let mut response = ApiResponse::ok_with_service(data, state.config.service_name.clone())
        .with_duration(meta.started.elapsed().as_millis() as u64);
    if let Some(request_id) = meta.request_id {
        response = response.with_request_id(request_id);
    }
    Ok(Json(response))
}

/// 连接数据库
#[utoipa::path(
    post,
    path = "/api/session/connect",
    tag = "session",
    request_body = ConnectForm,
    responses(
        (status = 200, description = "连接已建立", body = ApiResponse<ConnectionSummary>),
        (status = 400, description = "表单校验失败"),
        (status = 502, description = "数据库无法连接")
    )
)]
pub async fn connect(
    State(state): State<AppState>,
    meta: ReplyMeta,
    Json(form): Json<ConnectForm>,
) -> ApiResult<ConnectionSummary> {
    let service = ChatService::new(&state);
    let data = service.connect(form).await?;
    ok(&state, meta, data)
}

/// 断开当前数据库连接
#[utoipa::path(
    post,
    path = "/api/session/disconnect",
    tag = "session",
    responses(
        (status = 200, description = "之前是否已连接", body = ApiResponse<bool>)
    )
)]
pub async fn disconnect(
    State(state): State<AppState>,
    meta: ReplyMeta,
) -> ApiResult<bool> {
    let service = ChatService::new(&state);
    let data = service.disconnect().await;
    ok(&state, meta, data)
}

/// 获取会话状态
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "session",
    responses(
        (status = 200, description = "会话状态", body = ApiResponse<SessionStatus>)
    )
)]
pub async fn session_status(
    State(state): State<AppState>,
    meta: ReplyMeta,
) -> ApiResult<SessionStatus> {
    let service = ChatService::new(&state);
    let data = service.status().await;
    ok(&state, meta, data)
}

/// 获取数据库结构快照
#[utoipa::path(
    get,
    path = "/api/session/schema",
    tag = "session",
    responses(
        (status = 200, description = "结构快照", body = ApiResponse<SchemaSnapshot>),
        (status = 409, description = "未连接数据库")
    )
)]
pub async fn schema(
    State(state): State<AppState>,
    meta: ReplyMeta,
) -> ApiResult<SchemaSnapshot> {
    let service = ChatService::new(&state);
    let data = service.schema().await?;
    ok(&state, meta, data)
}

/// 测试当前数据库连接
#[utoipa::path(
    get,
    path = "/api/session/test",
    tag = "session",
    responses(
        (status = 200, description = "连接测试结果", body = ApiResponse<ConnectionTestResult>),
        (status = 409, description = "未连接数据库")
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    meta: ReplyMeta,
) -> ApiResult<ConnectionTestResult> {
    let service = ChatService::new(&state);
    let data = service.test_connection().await?;
    ok(&state, meta, data)
}

/// 提问并执行生成的 SQL
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = AskRequest,
    responses(
        (status = 200, description = "本轮问答（失败信息记录在 error 字段）", body = ApiResponse<ChatTurn>),
        (status = 400, description = "问题为空或过长"),
        (status = 409, description = "未连接数据库")
    )
)]
pub async fn ask(
    State(state): State<AppState>,
    meta: ReplyMeta,
    Json(req): Json<AskRequest>,
) -> ApiResult<ChatTurn> {
    let service = ChatService::new(&state);
    let data = service.ask(req).await?;
    ok(&state, meta, data)
}

/// 获取聊天历史
#[utoipa::path(
    get,
    path = "/api/chat/history",
    tag = "chat",
    responses(
        (status = 200, description = "按时间排序的历史记录", body = ApiResponse<Vec<ChatTurn>>)
    )
)]
pub async fn history(
    State(state): State<AppState>,
    meta: ReplyMeta,
) -> ApiResult<Vec<ChatTurn>> {
    let service = ChatService::new(&state);
    let data = service.history().await;
    ok(&state, meta, data)
}

/// 清空聊天历史
#[utoipa::path(
    delete,
    path = "/api/chat/history",
    tag = "chat",
    responses(
        (status = 200, description = "清除的条数", body = ApiResponse<usize>)
    )
)]
pub async fn clear_history(
    State(state): State<AppState>,
    meta: ReplyMeta,
) -> ApiResult<usize> {
    let service = ChatService::new(&state);
    let data = service.clear_history().await;
    ok(&state, meta, data)
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // never wait behind a running question
    let connected = state.session.try_lock().ok().map(|s| s.active.is_some());
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        connected,
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 是否已连接数据库（会话忙时省略）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}
