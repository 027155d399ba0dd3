//! 聊天服务模块

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use validator::Validate;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::chat::{AskRequest, ChatTurn};
use common::models::connection::{
    ConnectForm, ConnectionSummary, ConnectionTestResult, SessionStatus,
};
use common::models::schema::SchemaSnapshot;
use common::utils::SqlGuard;

use crate::connector::DatabasePool;
use crate::executor;
use crate::llm::LlmClient;
use crate::presenter;
use crate::session::{ActiveConnection, Session};
use crate::state::AppState;
use crate::translator;

/// 聊天服务 Trait
#[async_trait]
pub trait ChatServiceTrait: Send + Sync {
    /// 连接数据库（替换已有连接）
    async fn connect(&self, form: ConnectForm) -> AppResult<ConnectionSummary>;

    /// 断开当前连接，返回之前是否已连接
    async fn disconnect(&self) -> bool;

    /// 获取会话状态
    async fn status(&self) -> SessionStatus;

    /// 获取（必要时采集）数据库结构快照
    async fn schema(&self) -> AppResult<SchemaSnapshot>;

    /// 测试当前连接
    async fn test_connection(&self) -> AppResult<ConnectionTestResult>;

    /// 提问：生成 SQL、校验、执行并解读结果
    async fn ask(&self, req: AskRequest) -> AppResult<ChatTurn>;

    /// 获取聊天历史
    async fn history(&self) -> Vec<ChatTurn>;

    /// 清空聊天历史，返回清除的条数
    async fn clear_history(&self) -> usize;
}

/// Text2SQL 聊天服务
pub struct ChatService {
    config: AppConfig,
    session: Arc<Mutex<Session>>,
    llm: Arc<dyn LlmClient>,
}

impl ChatService {
    /// 创建新的聊天服务实例
    pub fn new(state: &AppState) -> Self {
        Self {
            config: state.config.clone(),
            session: state.session.clone(),
            llm: state.llm.clone(),
        }
    }

    /// Runs one question against the active connection.
    ///
    /// Failures are recorded on the returned turn.
    async fn run_turn(&self, active: &mut ActiveConnection, question: &str) -> ChatTurn {
        let mut turn = ChatTurn::new(question);
        let api_key = active.api_key.clone();

        let raw_sql = match self.generate_sql(active, &api_key, question).await {
            Ok(sql) => sql,
            Err(e) => {
                tracing::warn!(error = %e, "SQL generation failed");
                turn.error = Some(format!("Failed to generate SQL: {}", e));
                return turn;
            }
        };

        let sql = match SqlGuard::check(&raw_sql, active.pool.engine()) {
            Ok(sql) => sql,
            Err(e) => {
                tracing::warn!(sql = %raw_sql, error = %e, "generated SQL rejected");
                turn.sql = Some(raw_sql);
                turn.error = Some(e.to_string());
                return turn;
            }
        };
        turn.sql = Some(sql.clone());

        let result =
            match executor::fetch_read_only(&active.pool, &sql, self.config.query_row_limit).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(%sql, error = %e, "query failed");
                    turn.error = Some(match e {
                        AppError::DatabaseQuery(msg) => format!("Query execution failed: {}", msg),
                        other => other.to_string(),
                    });
                    return turn;
                }
            };

        turn.narration =
            presenter::narrate(self.llm.as_ref(), &api_key, question, &sql, &result).await;
        tracing::info!(
            turn = %turn.id,
            rows = result.row_count,
            truncated = result.truncated,
            narrated = turn.narration.is_some(),
            "question answered"
        );
        turn.result = Some(result);
        turn
    }

    async fn generate_sql(
        &self,
        active: &mut ActiveConnection,
        api_key: &str,
        question: &str,
    ) -> AppResult<String> {
        let snapshot = active.schema(self.config.schema_sample_rows).await?;
        translator::translate(self.llm.as_ref(), api_key, question, snapshot).await
    }
}

#[async_trait]
impl ChatServiceTrait for ChatService {
    async fn connect(&self, form: ConnectForm) -> AppResult<ConnectionSummary> {
        let api_key = form
            .api_key()
            .map(str::to_string)
            .or_else(|| self.config.llm.default_api_key.clone())
            .ok_or_else(|| AppError::Validation("LLM API key is required".into()))?;
        let profile = form.into_profile()?;

        let mut session = self.session.lock().await;

        let pool = DatabasePool::connect(&profile, &self.config).await?;
        let tables = match pool.table_names().await {
            Ok(tables) => tables,
            Err(e) => {
                pool.close().await;
                return Err(AppError::DatabaseConnection(e.to_string()));
            }
        };

        let summary = ConnectionSummary {
            engine: profile.engine,
            target: profile.redacted_url(),
            tables,
            connected_at: Utc::now(),
        };
        tracing::info!(
            url = %summary.target,
            tables = summary.tables.len(),
            "连接已建立"
        );

        session
            .replace(ActiveConnection {
                profile,
                pool,
                api_key,
                summary: summary.clone(),
                schema: None,
            })
            .await;
        Ok(summary)
    }

    async fn disconnect(&self) -> bool {
        self.session.lock().await.close().await
    }

    async fn status(&self) -> SessionStatus {
        self.session.lock().await.status()
    }

    async fn schema(&self) -> AppResult<SchemaSnapshot> {
        let mut session = self.session.lock().await;
        let active = session.active.as_mut().ok_or(AppError::NotConnected)?;
        let snapshot = active.schema(self.config.schema_sample_rows).await?;
        Ok(snapshot.clone())
    }

    async fn test_connection(&self) -> AppResult<ConnectionTestResult> {
        let session = self.session.lock().await;
        let active = session.active.as_ref().ok_or(AppError::NotConnected)?;

        let round_trip = async {
            let latency = active.pool.ping().await?;
            let tables = active.pool.table_names().await?;
            Ok::<_, AppError>((latency, tables.len()))
        };
        Ok(match round_trip.await {
            Ok((latency, table_count)) => ConnectionTestResult {
                success: true,
                latency_ms: Some(latency.as_millis() as u64),
                table_count: Some(table_count),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "connection test failed");
                ConnectionTestResult {
                    success: false,
                    latency_ms: None,
                    table_count: None,
                    error: Some(e.to_string()),
                }
            }
        })
    }

    async fn ask(&self, req: AskRequest) -> AppResult<ChatTurn> {
        req.validate()?;
        let question = req.question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("question must not be blank".into()));
        }

        let mut session = self.session.lock().await;
        let Session { active, history } = &mut *session;
        let active = active.as_mut().ok_or(AppError::NotConnected)?;

        let turn = self.run_turn(active, question).await;
        history.push(turn.clone());
        Ok(turn)
    }

    async fn history(&self) -> Vec<ChatTurn> {
        self.session.lock().await.history.to_vec()
    }

    async fn clear_history(&self) -> usize {
        let mut session = self.session.lock().await;
        let cleared = session.history.len();
        session.history.clear();
        cleared
    }
}
