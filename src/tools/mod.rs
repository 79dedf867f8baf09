/// Tools Module
///
/// Every MCP tool lives in one of the submodules below, grouped by the
/// collaborator it talks to. Each submodule exports a `register` function that
/// adds its descriptors and handlers to the registry; `build_registry` calls
/// them in catalog order (file tools, web tools, user tools).

pub mod files;
pub mod http;
pub mod stock;
pub mod users;
pub mod web;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::error::ToolError;
use crate::core::registry::{Arguments, RegistryError, ToolRegistry};
use crate::core::sandbox::Sandbox;
use crate::db::Database;

use self::http::HttpClient;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Initialize and register all tools.
///
/// Add new tools by registering them from the matching submodule here; the
/// dispatcher and protocol layers pick them up without further changes.
pub fn build_registry(settings: &Settings, db: Arc<Database>) -> Result<ToolRegistry, SetupError> {
    let mut registry = ToolRegistry::new();
    let sandbox = Sandbox::new(&settings.base_dir);
    let http = HttpClient::new(settings.http_timeout)?;

    files::register(&mut registry, &sandbox, settings.max_file_bytes)?;
    web::register(&mut registry, &http, &settings.search_url)?;
    stock::register(&mut registry, &http, &settings.stock_url)?;
    users::register(&mut registry, &db)?;

    tracing::info!(tools = registry.len(), "tool registry initialized");
    Ok(registry)
}

/// Optional string argument.
pub(crate) fn str_arg<'a>(args: &'a Arguments, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// String argument the schema marks as required.
pub(crate) fn required_str<'a>(args: &'a Arguments, key: &str) -> Result<&'a str, ToolError> {
    str_arg(args, key).ok_or_else(|| ToolError::MissingParameter(key.to_string()))
}

/// Optional integer argument; numeric strings are accepted.
pub(crate) fn int_arg(args: &Arguments, key: &str) -> Result<Option<i64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| invalid(key, "integer")),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid(key, "integer")),
        Some(_) => Err(invalid(key, "integer")),
    }
}

pub(crate) fn required_int(args: &Arguments, key: &str) -> Result<i64, ToolError> {
    int_arg(args, key)?.ok_or_else(|| ToolError::MissingParameter(key.to_string()))
}

pub(crate) fn bool_arg(args: &Arguments, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

fn invalid(key: &str, expected: &str) -> ToolError {
    ToolError::InvalidParameter {
        name: key.to_string(),
        expected: expected.to_string(),
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
