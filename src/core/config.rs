/// Server Configuration
///
/// All runtime settings are read once from environment variables (a `.env`
/// file in the working directory is loaded first when present) and then shared
/// read-only for the lifetime of the process.
///
/// Environment Variables:
/// - SERVER_NAME / SERVER_VERSION: reported in `initialize` responses
/// - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "http")
/// - HOST / PORT: HTTP bind address (default: 0.0.0.0:8000)
/// - WORKER_THREADS: actix worker count (default: CPU count, max 16)
/// - MCP_BASE_DIR: sandbox root for file tools (default: ./mcp_files)
/// - MAX_FILE_BYTES: largest file `read_file` will return (default: 100 KB)
/// - DATABASE_PATH: SQLite file backing the user tools
/// - HTTP_TIMEOUT_SECS: ceiling for outbound HTTP calls (default: 30)
/// - SEARCH_URL / STOCK_API_URL: web search and quote backends
/// - OPENAI_API_KEY / OPENAI_BASE_URL / OPENAI_MODEL: chat collaborator

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default ceiling for `read_file`.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 100 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid transport mode '{0}'. Must be 'stdio', 'http', or 'both'")]
    InvalidTransport(String),
}

/// Which transports the process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stdio,
    Http,
    Both,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            "both" => Ok(Self::Both),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

/// Connection settings for the OpenAI-compatible chat collaborator.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Immutable process-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_name: String,
    pub server_version: String,
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Root directory every file tool is confined to
    pub base_dir: PathBuf,
    pub max_file_bytes: u64,
    pub database_path: PathBuf,
    pub http_timeout: Duration,
    pub search_url: String,
    pub stock_url: String,
    /// None disables the chat endpoint's model calls
    pub llm: Option<LlmSettings>,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case in production.
        let _ = dotenvy::dotenv();

        let transport = get_env_var("MCP_TRANSPORT_MODE", "http").parse()?;
        let workers = match std::env::var("WORKER_THREADS") {
            Ok(raw) => parse_value("WORKER_THREADS", &raw)?,
            Err(_) => num_cpus::get().clamp(1, 16),
        };

        let llm = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| LlmSettings {
                api_key,
                base_url: get_env_var("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                model: get_env_var("OPENAI_MODEL", "gpt-3.5-turbo"),
            });

        Ok(Self {
            server_name: get_env_var("SERVER_NAME", "mcp-file-web-server"),
            server_version: get_env_var("SERVER_VERSION", env!("CARGO_PKG_VERSION")),
            transport,
            host: get_env_var("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8000)?,
            workers,
            base_dir: PathBuf::from(get_env_var("MCP_BASE_DIR", "./mcp_files")),
            max_file_bytes: parse_env("MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES)?,
            database_path: PathBuf::from(get_env_var("DATABASE_PATH", "./mcp_data/users.db")),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?),
            search_url: get_env_var("SEARCH_URL", "https://html.duckduckgo.com/html/"),
            stock_url: get_env_var(
                "STOCK_API_URL",
                "https://query1.finance.yahoo.com/v8/finance/chart",
            ),
            llm,
        })
    }

    /// Settings rooted at `base_dir` with unreachable web backends.
    #[cfg(test)]
    pub fn for_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            server_name: "mcp-file-web-server".to_string(),
            server_version: "1.0.0".to_string(),
            transport: TransportMode::Http,
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: 1,
            base_dir: base_dir.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            database_path: PathBuf::from(":memory:"),
            http_timeout: Duration::from_secs(5),
            search_url: "http://127.0.0.1:9/html/".to_string(),
            stock_url: "http://127.0.0.1:9/chart".to_string(),
            llm: None,
        }
    }
}

/// Get environment variable value with a default fallback.
pub fn get_env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
