//! LLM chat-completion client.
//!
//! [`LlmClient`] is the seam between the chat pipeline and the hosted model.
//! [`OpenAiCompatClient`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint (Groq by default).

use std::time::Duration;

use async_trait::async_trait;
use common::config::LlmConfig;
use common::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const COMPLETIONS_PATH: &str = "/chat/completions";

/// One completion call: a system prompt and a single user message.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Bearer key supplied at connect time.
    pub api_key: &'a str,
    /// System prompt.
    pub system: &'a str,
    /// User message.
    pub user: &'a str,
}

/// Text completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model's reply text.
    async fn complete(&self, request: CompletionRequest<'_>) -> AppResult<String>;
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ApiMessage<'a>; 2],
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for OpenAI-compatible chat-completion APIs.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    url: String,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            url: format!("{}{}", config.base_url.trim_end_matches('/'), COMPLETIONS_PATH),
        })
    }

    /// Completion endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> AppResult<String> {
        let body = ApiRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ApiMessage {
                    role: "system",
                    content: request.system,
                },
                ApiMessage {
                    role: "user",
                    content: request.user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::LlmService("LLM request timed out".to_string())
                } else {
                    AppError::LlmService(format!("LLM request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text, "LLM API returned an error");
            return Err(AppError::LlmService(format!("LLM API returned {}", status)));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmService(format!("failed to parse LLM response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AppError::LlmService("LLM returned an empty reply".to_string()))
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted in-process LLM for tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Prompt pair recorded by [`ScriptedLlm`].
    #[derive(Debug, Clone)]
    pub struct RecordedPrompt {
        pub api_key: String,
        pub system: String,
        pub user: String,
    }

    /// Replies with queued answers in order and records every prompt.
    #[derive(Default)]
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<AppResult<String>>>,
        prompts: Mutex<Vec<RecordedPrompt>>,
    }

    impl ScriptedLlm {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.replies.lock().unwrap().push_back(Ok(text.to_string()));
            self
        }

        pub fn fail(self, message: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(AppError::LlmService(message.to_string())));
            self
        }

        pub fn push_reply(&self, text: &str) {
            self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        }

        pub fn prompts(&self) -> Vec<RecordedPrompt> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest<'_>) -> AppResult<String> {
            self.prompts.lock().unwrap().push(RecordedPrompt {
                api_key: request.api_key.to_string(),
                system: request.system.to_string(),
                user: request.user.to_string(),
            });
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::LlmService("no scripted reply".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let config = LlmConfig {
            base_url: "https://api.groq.com/openai/v1/".to_string(),
            ..LlmConfig::default()
        };
        let client = OpenAiCompatClient::new(&config).unwrap();
        assert_eq!(client.url(), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ApiRequest {
            model: "llama3-8b-8192",
            temperature: 0.0,
            messages: [
                ApiMessage { role: "system", content: "sys" },
                ApiMessage { role: "user", content: "hi" },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3-8b-8192");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_parse_reply() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"SELECT 1"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn test_scripted_llm_replays_in_order() {
        let llm = testing::ScriptedLlm::new().reply("one").fail("down");
        let req = CompletionRequest { api_key: "k", system: "s", user: "u" };
        assert_eq!(llm.complete(req).await.unwrap(), "one");
        assert!(llm.complete(req).await.is_err());
        assert_eq!(llm.prompts().len(), 2);
    }
}
