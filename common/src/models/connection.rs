//! Connection form and profile models.
//!
//! The form is what the page submits; the profile is the validated,
//! normalized version the connector turns into a pool.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::{AppError, AppResult};

/// Placeholder written instead of the password in any displayed URL.
pub const REDACTED: &str = "***";

/// Supported database engines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    /// PostgreSQL server.
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL server.
    MySql,
    /// Embedded SQLite file.
    Sqlite,
}

impl DbEngine {
    /// Returns the default port for this engine.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DbEngine::Postgres => Some(5432),
            DbEngine::MySql => Some(3306),
            DbEngine::Sqlite => None,
        }
    }

    /// URL scheme understood by the driver.
    pub fn scheme(&self) -> &'static str {
        match self {
            DbEngine::Postgres => "postgres",
            DbEngine::MySql => "mysql",
            DbEngine::Sqlite => "sqlite",
        }
    }

    /// Dialect name used in prompts.
    pub fn dialect(&self) -> &'static str {
        match self {
            DbEngine::Postgres => "PostgreSQL",
            DbEngine::MySql => "MySQL",
            DbEngine::Sqlite => "SQLite",
        }
    }

    /// Quotes an identifier for this engine.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            DbEngine::MySql => format!("`{}`", ident.replace('`', "``")),
            DbEngine::Postgres | DbEngine::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

impl std::fmt::Display for DbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dialect())
    }
}

/// Connection form as submitted by the page.
///
/// Empty strings are treated as missing fields.
#[derive(Clone, Deserialize, Validate, ToSchema)]
pub struct ConnectForm {
    /// Database engine.
    pub engine: DbEngine,
    /// Server host (PostgreSQL/MySQL).
    #[validate(length(max = 255, message = "Host must be at most 255 characters"))]
    #[serde(default)]
    pub host: Option<String>,
    /// Server port; engine default when omitted.
    #[serde(default)]
    pub port: Option<u16>,
    /// Database user (PostgreSQL/MySQL).
    #[validate(length(max = 128, message = "Username must be at most 128 characters"))]
    #[serde(default)]
    pub username: Option<String>,
    /// Database password (PostgreSQL/MySQL).
    #[serde(default)]
    pub password: Option<String>,
    /// Database name, or file path for SQLite.
    #[validate(length(min = 1, max = 1024, message = "Database must be 1-1024 characters"))]
    pub database: String,
    /// LLM API key; falls back to the configured default.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ConnectForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectForm")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl ConnectForm {
    /// Validates the form and builds a connection profile.
    ///
    /// SQLite needs only the file path. PostgreSQL and MySQL need host,
    /// database, username and password; the port defaults per engine.
    pub fn into_profile(self) -> AppResult<ConnectionProfile> {
        self.validate()?;

        let database = self.database.trim().to_string();
        if database.is_empty() {
            return Err(AppError::Validation(match self.engine {
                DbEngine::Sqlite => "database file path is required".into(),
                _ => "database name is required".into(),
            }));
        }

        if self.engine == DbEngine::Sqlite {
            return Ok(ConnectionProfile {
                engine: self.engine,
                host: None,
                port: None,
                username: None,
                password: None,
                database,
            });
        }

        let host = required(self.host, "host")?;
        if host
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '@' | '?' | '#'))
        {
            return Err(AppError::Validation(format!("invalid host: {}", host)));
        }
        let port = match self.port {
            Some(0) => return Err(AppError::Validation("port must be non-zero".into())),
            Some(port) => port,
            None => self.engine.default_port().unwrap_or_default(),
        };

        Ok(ConnectionProfile {
            engine: self.engine,
            host: Some(host),
            port: Some(port),
            username: Some(required(self.username, "username")?),
            password: Some(required_raw(self.password, "password")?),
            database,
        })
    }

    /// API key from the form, if one was typed.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

/// Like [`required`] but keeps surrounding whitespace, which may be part of a password.
fn required_raw(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

/// Validated connection parameters held for the session.
#[derive(Clone)]
pub struct ConnectionProfile {
    /// Database engine.
    pub engine: DbEngine,
    /// Server host.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Database user.
    pub username: Option<String>,
    /// Database password.
    pub password: Option<String>,
    /// Database name or SQLite file path.
    pub database: String,
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("engine", &self.engine)
            .field("target", &self.redacted_url())
            .finish()
    }
}

impl ConnectionProfile {
    /// Assembles the driver connection string.
    ///
    /// Credentials are percent-encoded, so passwords containing `@`, `:` or
    /// `/` survive the round trip.
    pub fn connection_url(&self) -> AppResult<String> {
        self.build_url(self.password.as_deref())
    }

    /// The connection string with the password replaced by `***`.
    pub fn redacted_url(&self) -> String {
        let password = self.password.as_ref().map(|_| REDACTED);
        self.build_url(password).unwrap_or_else(|_| {
            format!(
                "{}://{}/{}",
                self.engine.scheme(),
                self.host.as_deref().unwrap_or_default(),
                self.database
            )
        })
    }

    fn build_url(&self, password: Option<&str>) -> AppResult<String> {
        if self.engine == DbEngine::Sqlite {
            return Ok(format!("sqlite://{}", self.database));
        }

        let host = self
            .host
            .as_deref()
            .ok_or_else(|| AppError::Validation(format!("{} requires host", self.engine)))?;
        let port = self
            .port
            .or_else(|| self.engine.default_port())
            .unwrap_or_default();

        let mut url = Url::parse(&format!("{}://{}:{}", self.engine.scheme(), host, port))
            .map_err(|e| AppError::Validation(format!("invalid host {}: {}", host, e)))?;
        url.set_path(&self.database);
        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| AppError::Validation("username cannot be set on this URL".into()))?;
        }
        if password.is_some() {
            url.set_password(password)
                .map_err(|_| AppError::Validation("password cannot be set on this URL".into()))?;
        }
        Ok(url.to_string())
    }
}

/// Connection details returned to the page (never includes the password).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionSummary {
    /// Database engine.
    pub engine: DbEngine,
    /// Redacted connection string.
    pub target: String,
    /// Usable table names.
    pub tables: Vec<String>,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
}

/// Result of the "Test Connection" action.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionTestResult {
    /// Whether the database answered.
    pub success: bool,
    /// Round-trip latency in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Number of usable tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_count: Option<usize>,
    /// Error message when the test failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Current session status.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatus {
    /// Whether a database is connected.
    pub connected: bool,
    /// Active connection, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionSummary>,
    /// Whether the schema snapshot has been captured.
    pub schema_cached: bool,
    /// Number of turns in the chat history.
    pub history_len: usize,
}
