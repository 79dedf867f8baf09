/// MCP Tool Server Entry Point
///
/// Loads settings from the environment (and `.env`), opens the user store,
/// builds the tool registry and starts the configured transport: STDIO, HTTP
/// or both at once.
///
/// Environment variables are listed in `core::config`. Logging is controlled
/// with `RUST_LOG` and `LOG_FORMAT=json`; all logs go to stderr.

mod chat;
mod core;
mod db;
mod tools;

use std::io;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::chat::ChatAgent;
use crate::chat::llm::{CompletionProvider, OpenAiCompatClient};
use crate::core::config::{Settings, TransportMode};
use crate::core::dispatcher::Dispatcher;
use crate::core::protocol::{McpContext, ServerInfo};
use crate::core::server::{self, AppState};
use crate::db::Database;
use crate::tools::http::HttpClient;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcp_tool_server=info,actix_web=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let settings = Settings::from_env().map_err(io::Error::other)?;
    init_tracing();

    std::fs::create_dir_all(&settings.base_dir)?;
    let db = Arc::new(Database::open(&settings.database_path).map_err(io::Error::other)?);
    tracing::info!(
        base_dir = %settings.base_dir.display(),
        database = %settings.database_path.display(),
        "storage ready"
    );

    let registry = tools::build_registry(&settings, db).map_err(io::Error::other)?;
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let ctx = McpContext {
        info: ServerInfo {
            name: settings.server_name.clone(),
            version: settings.server_version.clone(),
        },
        dispatcher: dispatcher.clone(),
    };

    match settings.transport {
        TransportMode::Stdio => server::run_server_stdio(ctx).await,
        TransportMode::Http => {
            let state = app_state(&settings, ctx, dispatcher)?;
            server::run_server_http(&settings, state).await
        }
        TransportMode::Both => {
            let state = app_state(&settings, ctx.clone(), dispatcher)?;

            // STDIO runs in the background; HTTP owns the process lifetime.
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(ctx).await {
                    tracing::error!(error = %e, "STDIO server error");
                }
            });
            let http_result = server::run_server_http(&settings, state).await;
            stdio_handle.abort();
            http_result
        }
    }
}

fn app_state(settings: &Settings, mcp: McpContext, dispatcher: Dispatcher) -> io::Result<AppState> {
    let provider = match &settings.llm {
        Some(llm) => {
            let http = HttpClient::new(settings.http_timeout).map_err(io::Error::other)?;
            let client: Arc<dyn CompletionProvider> =
                Arc::new(OpenAiCompatClient::new(llm, http.client().clone()));
            Some(client)
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set; chat endpoint will not call a model");
            None
        }
    };

    Ok(AppState {
        mcp,
        chat: ChatAgent::new(provider, dispatcher),
        base_dir: settings.base_dir.clone(),
        database: settings.database_path.clone(),
    })
}
