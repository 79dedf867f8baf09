/// MCP Server Transports
///
/// This module wires the protocol layer to the outside world:
/// - HTTP server setup with Actix Web (JSON-RPC plus the legacy REST routes)
/// - STDIO server implementation for line-based communication
///
/// Both transports answer through `protocol::handle_request`, so a request
/// gets the same envelope whichever way it arrives.

use std::path::PathBuf;
use std::time::Duration;

use actix_web::{
    App, HttpResponse, HttpServer,
    middleware::{Compress, DefaultHeaders, Logger},
    web,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::chat::ChatAgent;
use crate::core::config::Settings;
use crate::core::dispatcher::ToolResult;
use crate::core::error::{DispatchError, PARSE_ERROR};
use crate::core::protocol::{McpContext, McpResponse, ParseError, handle_request, parse_request};
use crate::core::registry::Arguments;

/// Application state shared across all worker threads in HTTP mode.
#[derive(Clone)]
pub struct AppState {
    pub mcp: McpContext,
    pub chat: ChatAgent,
    /// Reported by the health endpoint
    pub base_dir: PathBuf,
    pub database: PathBuf,
}

/// Register every HTTP route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/mcp/tools", web::get().to(list_tools))
        .route("/mcp/run", web::post().to(run_tool))
        .route("/api/stock/{symbol}", web::get().to(stock_quote))
        .route("/api/chat", web::post().to(chat))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(service_info));
}

fn error_body(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

fn invalid_json() -> HttpResponse {
    HttpResponse::BadRequest().json(error_body("Invalid JSON"))
}

/// Health check endpoint handler.
async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "base_dir": state.base_dir.display().to_string(),
        "database": state.database.display().to_string(),
    }))
}

async fn service_info(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "name": state.mcp.info.name,
        "version": state.mcp.info.version,
        "endpoints": {
            "mcp": "/mcp",
            "tools_list": "/mcp/tools",
            "tools_run": "/mcp/run",
            "chat": "/api/chat",
            "stock": "/api/stock/{symbol}",
            "health": "/health"
        }
    }))
}

/// MCP JSON-RPC request handler.
///
/// Bodies that are not a JSON object get a plain 400; objects with wrongly
/// typed fields get an Invalid Request envelope. Everything else is answered
/// with HTTP 200 and a JSON-RPC envelope, errors included.
async fn mcp_handler(state: web::Data<AppState>, body: Bytes) -> HttpResponse {
    match parse_request(&body) {
        Ok(req) => HttpResponse::Ok().json(handle_request(&state.mcp, req).await),
        Err(err) => match err.into_response() {
            Some(envelope) => HttpResponse::Ok().json(envelope),
            None => invalid_json(),
        },
    }
}

/// Raw registry listing.
async fn list_tools(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "tools": state.mcp.dispatcher.registry().list() }))
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

/// Direct tool invocation without the JSON-RPC envelope.
///
/// The body is the tool's result object itself. A sandbox denial is a 403.
async fn run_tool(state: web::Data<AppState>, body: Bytes) -> HttpResponse {
    let Ok(run) = serde_json::from_slice::<RunRequest>(&body) else {
        return invalid_json();
    };
    let tool = run.tool.unwrap_or_default();
    let input = match run.input {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return HttpResponse::BadRequest()
                .json(error_body("Invalid 'input' parameter: expected object"));
        }
    };

    match state.mcp.dispatcher.call(&tool, input).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(err @ DispatchError::UnknownTool(_)) => HttpResponse::Ok().json(error_body(err.to_string())),
        Err(err @ DispatchError::AccessDenied(_)) => {
            HttpResponse::Forbidden().json(error_body(err.to_string()))
        }
    }
}

/// Stock quote shortcut for browser clients; any failure is a 400.
async fn stock_quote(state: web::Data<AppState>, symbol: web::Path<String>) -> HttpResponse {
    let mut args = Arguments::new();
    args.insert("symbol".to_string(), Value::String(symbol.into_inner()));

    match state.mcp.dispatcher.call("get_stock_price", args).await {
        Ok(ToolResult::Success(quote)) => HttpResponse::Ok().json(quote),
        Ok(ToolResult::Failure(message)) => HttpResponse::BadRequest().json(error_body(message)),
        Err(err) => HttpResponse::BadRequest().json(error_body(err.to_string())),
    }
}

async fn chat(state: web::Data<AppState>, body: Bytes) -> HttpResponse {
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return invalid_json();
    };
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    HttpResponse::Ok().json(state.chat.respond(message).await)
}

/// Run the MCP server in HTTP mode.
///
/// # Configuration
/// The server is configured with:
/// - Worker threads: from settings (CPU count, max 16, by default)
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Disconnect timeout: 2 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(settings: &Settings, state: AppState) -> std::io::Result<()> {
    let bind_addr = format!("{}:{}", settings.host, settings.port);
    let workers = settings.workers.max(1);

    tracing::info!(
        name = %state.mcp.info.name,
        version = %state.mcp.info.version,
        bind = %bind_addr,
        workers,
        chat_enabled = state.chat.is_enabled(),
        "MCP server starting (HTTP mode)"
    );

    let state = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            // %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(configure)
    })
    .workers(workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Reads JSON-RPC requests line-by-line from stdin and writes one response
/// line per request to stdout. Logging goes to stderr so stdout stays a
/// clean protocol stream.
pub async fn run_server_stdio(ctx: McpContext) -> std::io::Result<()> {
    tracing::info!(
        name = %ctx.info.name,
        version = %ctx.info.version,
        "MCP server starting (STDIO mode)"
    );

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&ctx, stdin, stdout).await
}

/// Serve line-delimited JSON-RPC from `reader` to `writer` until EOF.
///
/// Requests without an id are notifications and get no reply. A line that
/// is not a JSON object is answered with a Parse error carrying a null id.
async fn serve_lines<R, W>(ctx: &McpContext, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match parse_request(line.as_bytes()) {
            Ok(req) if req.is_notification() => {
                tracing::debug!(method = ?req.method, "notification received");
                continue;
            }
            Ok(req) => handle_request(ctx, req).await,
            Err(ParseError::InvalidJson) => {
                tracing::warn!("unparseable line on stdin");
                McpResponse::failure(None, PARSE_ERROR, "Parse error")
            }
            Err(err) => match err.into_response() {
                Some(envelope) => envelope,
                None => continue,
            },
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "cannot serialize response");
                continue;
            }
        };
        writer.write_all(encoded.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        // Flush per response; clients wait on each line.
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::Dispatcher;
    use crate::core::protocol::ServerInfo;
    use crate::db::Database;
    use crate::tools::build_registry;
    use actix_web::{http::StatusCode, test};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn app_state(dir: &TempDir) -> AppState {
        app_state_with(Settings::for_base_dir(dir.path()))
    }

    fn app_state_with(settings: Settings) -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new(Arc::new(build_registry(&settings, db).unwrap()));
        AppState {
            mcp: McpContext {
                info: ServerInfo {
                    name: settings.server_name.clone(),
                    version: settings.server_version.clone(),
                },
                dispatcher: dispatcher.clone(),
            },
            chat: ChatAgent::new(None, dispatcher),
            base_dir: settings.base_dir.clone(),
            database: settings.database_path.clone(),
        }
    }

    macro_rules! service {
        ($dir:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(app_state($dir)))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn invalid_json_is_a_plain_400() {
        let dir = TempDir::new().unwrap();
        let app = service!(&dir);

        for uri in ["/mcp", "/"] {
            let req = test::TestRequest::post()
                .uri(uri)
                .set_payload("{broken")
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({ "error": "Invalid JSON" }));
        }
    }

    #[actix_web::test]
    async fn json_rpc_is_served_on_both_paths() {
        let dir = TempDir::new().unwrap();
        let app = service!(&dir);

        let req = test::TestRequest::post()
            .uri("/")
            .set_json(json!({ "jsonrpc": "2.0", "id": "a", "method": "initialize" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], "a");
        assert_eq!(body["result"]["protocolVersion"], "2024-11-05");

        let req = test::TestRequest::post()
            .uri("/mcp")
            .set_json(json!({ "id": 2, "method": "tools/list" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 14);

        let req = test::TestRequest::post()
            .uri("/mcp")
            .set_json(json!({ "id": 3, "method": 5 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], 3);
        assert_eq!(body["error"]["code"], -32600);
    }

    #[actix_web::test]
    async fn legacy_run_maps_denial_to_403() {
        let dir = TempDir::new().unwrap();
        let app = service!(&dir);

        let req = test::TestRequest::post()
            .uri("/mcp/run")
            .set_json(json!({ "tool": "read_file", "input": { "path": "../../etc/passwd" } }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Access denied (outside allowed folder).");

        let req = test::TestRequest::post()
            .uri("/mcp/run")
            .set_json(json!({ "tool": "nope", "input": {} }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "error": "Unknown tool: nope" }));
    }

    #[actix_web::test]
    async fn legacy_run_returns_bare_results() {
        let dir = TempDir::new().unwrap();
        let app = service!(&dir);

        let req = test::TestRequest::post()
            .uri("/mcp/run")
            .set_json(json!({ "tool": "write_file", "input": { "path": "a.txt", "content": "hi" } }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "success": true, "path": "a.txt", "size": 2 }));

        let req = test::TestRequest::post()
            .uri("/mcp/run")
            .set_json(json!({ "tool": "read_file", "input": {} }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "error": "Missing 'path' parameter" }));

        let req = test::TestRequest::get().uri("/mcp/tools").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["tools"][0]["name"], "list_directory");
        assert!(body["tools"][0]["inputSchema"].is_object());
    }

    #[actix_web::test]
    async fn stock_failures_are_400() {
        let mut upstream = mockito::Server::new_async().await;
        upstream
            .mock("GET", "/AAPL")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut settings = Settings::for_base_dir(dir.path());
        settings.stock_url = upstream.url();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state_with(settings)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/stock/AAPL").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["error"],
            "Symbol not found: AAPL. For Indian stocks, use .NS (NSE) or .BO (BSE) suffix."
        );
    }

    #[actix_web::test]
    async fn health_and_chat_without_provider() {
        let dir = TempDir::new().unwrap();
        let app = service!(&dir);

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["base_dir"], dir.path().display().to_string());

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({ "message": "show all users" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["response"].as_str().unwrap().starts_with("OpenAI API is not configured"));
        assert_eq!(body["tool_used"], Value::Null);
    }

    #[tokio::test]
    async fn stdio_answers_requests_and_skips_notifications() {
        let dir = TempDir::new().unwrap();
        let ctx = app_state(&dir).mcp;
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#, "\n",
            "not json\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"list_directory"}}"#, "\n",
            r#"{"jsonrpc":"2.0","id":null,"method":"initialize"}"#, "\n",
        );

        let mut output = Vec::new();
        serve_lines(&ctx, input.as_bytes(), &mut output).await.unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(replies[1]["id"], Value::Null);
        assert_eq!(replies[2]["id"], 2);
        assert_eq!(replies[2]["result"]["isError"], false);
        assert_eq!(replies[3]["id"], Value::Null);
        assert_eq!(replies[3]["result"]["protocolVersion"], "2024-11-05");
    }
}
