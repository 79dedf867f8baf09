/// MCP Protocol Handling
///
/// JSON-RPC 2.0 request/response structures and the request state machine
/// shared by the HTTP and STDIO transports:
///
///   parse body -> dispatch on `method` -> initialize | tools/list |
///   tools/call | unknown method -> response envelope
///
/// No state survives between requests; each request is one full pass.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::dispatcher::Dispatcher;
use crate::core::error::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};
use crate::core::registry::Arguments;

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request structure for MCP protocol.
///
/// The `jsonrpc` marker is not required from clients. `id` is echoed back
/// untouched and `params` defaults to an empty object.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct McpRequest {
    /// Request ID for correlating responses. `None` means the member was
    /// absent (a notification); an explicit `null` is `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    /// MCP method name (e.g., "initialize", "tools/list", "tools/call")
    #[serde(default)]
    pub method: Option<String>,
    /// Method-specific parameters
    #[serde(default)]
    pub params: Option<Value>,
}

/// Keep a present `"id": null` distinct from a missing id.
fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl McpRequest {
    /// A request without an `id` member expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response structure.
///
/// Exactly one of `result` and `error` is set.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct McpResponse {
    pub jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct McpError {
    pub code: i32,
    pub message: String,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Why a raw body could not become an `McpRequest`.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not JSON, or not a JSON object. No id can be recovered, so the
    /// transport answers without an envelope.
    #[error("Invalid JSON")]
    InvalidJson,
    /// A JSON object whose fields have the wrong types.
    #[error("Invalid Request: {message}")]
    InvalidRequest { id: Option<Value>, message: String },
}

impl ParseError {
    /// Envelope for failures that still carry enough to answer in JSON-RPC.
    pub fn into_response(self) -> Option<McpResponse> {
        match self {
            Self::InvalidJson => None,
            Self::InvalidRequest { id, message } => Some(McpResponse::failure(
                id,
                INVALID_REQUEST,
                format!("Invalid Request: {message}"),
            )),
        }
    }
}

/// Parse a request body.
pub fn parse_request(body: &[u8]) -> Result<McpRequest, ParseError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ParseError::InvalidJson)?;
    if !value.is_object() {
        return Err(ParseError::InvalidJson);
    }
    let id = value.get("id").cloned();
    serde_json::from_value(value).map_err(|e| ParseError::InvalidRequest {
        id,
        message: e.to_string(),
    })
}

/// Server identity reported by `initialize`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Everything a request needs to be answered.
#[derive(Clone)]
pub struct McpContext {
    pub info: ServerInfo,
    pub dispatcher: Dispatcher,
}

/// Route a parsed request to its method handler.
pub async fn handle_request(ctx: &McpContext, req: McpRequest) -> McpResponse {
    let method = req.method.as_deref().unwrap_or_default();
    match method {
        "initialize" => handle_initialize(&ctx.info, req.id),
        "tools/list" => handle_tools_list(&ctx.dispatcher, req.id),
        "tools/call" => handle_tools_call(&ctx.dispatcher, req.id, req.params).await,
        _ => {
            tracing::debug!(method, "method not found");
            McpResponse::failure(
                req.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            )
        }
    }
}

/// Handle MCP initialize method.
///
/// Returns the protocol version, capabilities and server information. Has no
/// side effects and may be called any number of times.
fn handle_initialize(info: &ServerInfo, id: Option<Value>) -> McpResponse {
    McpResponse::success(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": info.name,
                "version": info.version
            }
        }),
    )
}

/// Handle MCP tools/list method.
fn handle_tools_list(dispatcher: &Dispatcher, id: Option<Value>) -> McpResponse {
    McpResponse::success(id, json!({ "tools": dispatcher.registry().list() }))
}

/// Handle MCP tools/call method.
///
/// Tool results (including in-band `{ "error": ... }` failures) are returned
/// as a single text content item holding the pretty-printed JSON. Unknown
/// tools and sandbox denials become JSON-RPC errors.
async fn handle_tools_call(
    dispatcher: &Dispatcher,
    id: Option<Value>,
    params: Option<Value>,
) -> McpResponse {
    let params = params.unwrap_or_else(|| json!({}));
    let tool_name = params.get("name").and_then(Value::as_str).unwrap_or_default();

    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return McpResponse::failure(id, INVALID_PARAMS, "Invalid params: arguments must be an object");
        }
    };

    match dispatcher.call(tool_name, arguments).await {
        Ok(result) => {
            let is_error = result.is_failure();
            let text = serde_json::to_string_pretty(&result).unwrap_or_default();
            McpResponse::success(
                id,
                json!({
                    "content": [
                        {
                            "type": "text",
                            "text": text
                        }
                    ],
                    "isError": is_error
                }),
            )
        }
        Err(err) => McpResponse::failure(id, err.code(), err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Settings;
    use crate::db::Database;
    use crate::tools;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context() -> (TempDir, McpContext) {
        let dir = TempDir::new().unwrap();
        let settings = Settings::for_base_dir(dir.path());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = tools::build_registry(&settings, db).unwrap();
        let ctx = McpContext {
            info: ServerInfo {
                name: settings.server_name.clone(),
                version: settings.server_version.clone(),
            },
            dispatcher: Dispatcher::new(Arc::new(registry)),
        };
        (dir, ctx)
    }

    async fn roundtrip(ctx: &McpContext, body: Value) -> Value {
        let req = parse_request(body.to_string().as_bytes()).unwrap();
        serde_json::to_value(handle_request(ctx, req).await).unwrap()
    }

    fn tool_payload(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn malformed_bodies_are_transport_errors() {
        assert!(matches!(parse_request(b"{not json"), Err(ParseError::InvalidJson)));
        assert!(matches!(parse_request(b"[1, 2]"), Err(ParseError::InvalidJson)));

        let err = parse_request(br#"{"method": 5, "id": 3}"#).unwrap_err();
        let response = err.into_response().unwrap();
        assert_eq!(response.id, Some(json!(3)));
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn null_id_is_not_a_notification() {
        let req = parse_request(br#"{"id": null, "method": "initialize"}"#).unwrap();
        assert_eq!(req.id, Some(Value::Null));
        assert!(!req.is_notification());

        let req = parse_request(br#"{"method": "notifications/initialized"}"#).unwrap();
        assert_eq!(req.id, None);
        assert!(req.is_notification());
    }

    #[tokio::test]
    async fn initialize_echoes_id_and_reports_server_info() {
        let (_dir, ctx) = context();
        let response = roundtrip(&ctx, json!({ "method": "initialize", "id": 7 })).await;
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert!(response["result"]["capabilities"]["tools"].is_object());
        assert_eq!(response["result"]["serverInfo"]["name"], "mcp-file-web-server");
        assert!(response.get("error").is_none());
    }

    #[tokio::test]
    async fn tools_list_is_stable_across_calls() {
        let (_dir, ctx) = context();
        let first = roundtrip(&ctx, json!({ "method": "tools/list", "id": "a" })).await;
        let second = roundtrip(&ctx, json!({ "method": "tools/list", "id": "a" })).await;
        assert_eq!(first, second);

        let names: Vec<&str> = first["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.first(), Some(&"list_directory"));
        assert_eq!(names.last(), Some(&"delete_user"));
        assert_eq!(names.len(), 14);
    }

    #[tokio::test]
    async fn unknown_method_names_the_method() {
        let (_dir, ctx) = context();
        let response = roundtrip(&ctx, json!({ "method": "resources/list", "id": null })).await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["message"], "Method not found: resources/list");
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let (_dir, ctx) = context();
        let response = roundtrip(
            &ctx,
            json!({ "method": "tools/call", "params": { "name": "format_disk" }, "id": 2 }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["message"], "Unknown tool: format_disk");
    }

    #[tokio::test]
    async fn traversal_in_tools_call_is_access_denied() {
        let (_dir, ctx) = context();
        let response = roundtrip(
            &ctx,
            json!({
                "method": "tools/call",
                "params": { "name": "read_file", "arguments": { "path": "../secret.txt" } },
                "id": 1
            }),
        )
        .await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["error"]["code"], -32000);
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Access denied")
        );
    }

    #[tokio::test]
    async fn tool_failures_stay_in_band() {
        let (_dir, ctx) = context();
        let response = roundtrip(
            &ctx,
            json!({ "method": "tools/call", "params": { "name": "read_file", "arguments": {} }, "id": 4 }),
        )
        .await;
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(tool_payload(&response), json!({ "error": "Missing 'path' parameter" }));
    }

    #[tokio::test]
    async fn write_then_read_through_the_protocol() {
        let (_dir, ctx) = context();
        let write = roundtrip(
            &ctx,
            json!({
                "method": "tools/call",
                "params": { "name": "write_file", "arguments": { "path": "notes/a.txt", "content": "hello" } },
                "id": 10
            }),
        )
        .await;
        assert_eq!(tool_payload(&write)["success"], true);

        let read = roundtrip(
            &ctx,
            json!({
                "method": "tools/call",
                "params": { "name": "read_file", "arguments": { "path": "notes/a.txt" } },
                "id": 11
            }),
        )
        .await;
        assert_eq!(read["result"]["isError"], false);
        assert_eq!(tool_payload(&read)["content"], "hello");
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid_params() {
        let (_dir, ctx) = context();
        let response = roundtrip(
            &ctx,
            json!({ "method": "tools/call", "params": { "name": "read_file", "arguments": [1] }, "id": 5 }),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }
}
