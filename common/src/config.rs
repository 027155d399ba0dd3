//! Application configuration.
//!
//! All settings come from environment variables and fall back to defaults
//! suitable for a local demo.

use std::str::FromStr;

/// Default Groq OpenAI-compatible endpoint.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Default chat model.
pub const DEFAULT_LLM_MODEL: &str = "llama3-8b-8192";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" | "" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Settings for the hosted LLM completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// API key used when the connect form leaves the field empty.
    pub default_api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.0,
            timeout_secs: 60,
            default_api_key: None,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and response metadata.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Database connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Pool size for client/server engines.
    pub max_connections: u32,
    /// Maximum number of rows returned for a single question.
    pub query_row_limit: usize,
    /// Sample rows per table included in the schema prompt.
    pub schema_sample_rows: usize,
    /// Number of chat turns kept in the session history.
    pub chat_history_limit: usize,
    /// SQLite file created and seeded at startup when set.
    pub demo_db_path: Option<String>,
    /// Log output format.
    pub log_format: LogFormat,
    /// LLM endpoint settings.
    pub llm: LlmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "chat-service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            connect_timeout_secs: 10,
            max_connections: 5,
            query_row_limit: 1000,
            schema_sample_rows: 3,
            chat_history_limit: 50,
            demo_db_path: None,
            log_format: LogFormat::Pretty,
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration and tags it with a service name.
    pub fn load_with_service(service: impl Into<String>) -> Self {
        Self {
            service_name: service.into(),
            ..Self::load()
        }
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            service_name: defaults.service_name,
            host: non_empty("SERVER_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "SERVER_PORT", defaults.port),
            connect_timeout_secs: parse_or(
                &lookup,
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)
                .max(1),
            query_row_limit: parse_or(&lookup, "QUERY_ROW_LIMIT", defaults.query_row_limit).max(1),
            schema_sample_rows: parse_or(
                &lookup,
                "SCHEMA_SAMPLE_ROWS",
                defaults.schema_sample_rows,
            ),
            chat_history_limit: parse_or(
                &lookup,
                "CHAT_HISTORY_LIMIT",
                defaults.chat_history_limit,
            )
            .max(1),
            demo_db_path: non_empty("DEMO_DB_PATH"),
            log_format: parse_or(&lookup, "LOG_FORMAT", defaults.log_format),
            llm: LlmConfig {
                base_url: non_empty("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
                model: non_empty("LLM_MODEL").unwrap_or(defaults.llm.model),
                temperature: parse_or(&lookup, "LLM_TEMPERATURE", defaults.llm.temperature),
                timeout_secs: parse_or(&lookup, "LLM_TIMEOUT_SECS", defaults.llm.timeout_secs),
                default_api_key: non_empty("LLM_API_KEY"),
            },
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid config value, using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.query_row_limit, 1000);
        assert_eq!(config.schema_sample_rows, 3);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.temperature, 0.0);
        assert!(config.llm.default_api_key.is_none());
        assert!(config.demo_db_path.is_none());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("SERVER_PORT", "9000"),
            ("LLM_MODEL", "mixtral"),
            ("LLM_API_KEY", "gsk_test"),
            ("LOG_FORMAT", "json"),
            ("DEMO_DB_PATH", "/tmp/demo.db"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.llm.model, "mixtral");
        assert_eq!(config.llm.default_api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.demo_db_path.as_deref(), Some("/tmp/demo.db"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[("SERVER_PORT", "not-a-port"), ("QUERY_ROW_LIMIT", "0")]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.query_row_limit, 1);
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let config = config_from(&[("LLM_API_KEY", "   ")]);
        assert!(config.llm.default_api_key.is_none());
    }
}
