/// Chat Module
///
/// Natural-language front end for the user tools. A message is sent to the
/// completion provider with a fixed system prompt; if the reply carries a
/// tool call for one of the user tools it is run through the dispatcher and
/// the result is rendered as readable text.

pub mod intent;
pub mod llm;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::core::dispatcher::{Dispatcher, ToolResult};
use crate::tools::users::USER_TOOLS;

use self::intent::extract_intent;
use self::llm::CompletionProvider;

pub const SYSTEM_PROMPT: &str = r#"You are a helpful assistant that can interact with a database of users.

You have access to the following tools to manage users:
1. get_all_users - Get all users from the database
2. get_user_by_id - Get a specific user by their ID (requires: id)
3. create_user - Create a new user (requires: name, email, password; optional: role)
4. update_user - Update an existing user (requires: id; optional: name, email, role, is_active)
5. delete_user - Delete a user by ID (requires: id)

When the user asks about users or wants to perform database operations, respond with a JSON object in this exact format:
{"tool": "tool_name", "arguments": {"arg1": "value1", "arg2": "value2"}}

Examples:
- "Show all users" -> {"tool": "get_all_users", "arguments": {}}
- "Get user with ID 1" -> {"tool": "get_user_by_id", "arguments": {"id": 1}}
- "Add user John with email john@test.com and password 123456" -> {"tool": "create_user", "arguments": {"name": "John", "email": "john@test.com", "password": "123456"}}
- "Update user 1 name to Jane" -> {"tool": "update_user", "arguments": {"id": 1, "name": "Jane"}}
- "Delete user 2" -> {"tool": "delete_user", "arguments": {"id": 2}}

If the user asks a general question or something not related to user management, respond naturally without JSON.
Always be helpful and concise in your responses."#;

const NOT_CONFIGURED: &str = "OpenAI API is not configured. Please add your API key to the .env file:\nOPENAI_API_KEY=sk-your-actual-key";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub tool_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<Value>,
}

impl ChatReply {
    fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            tool_used: None,
            raw_result: None,
        }
    }
}

#[derive(Clone)]
pub struct ChatAgent {
    provider: Option<Arc<dyn CompletionProvider>>,
    dispatcher: Dispatcher,
}

impl ChatAgent {
    /// `provider` is None when no completion API is configured.
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>, dispatcher: Dispatcher) -> Self {
        Self {
            provider,
            dispatcher,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn respond(&self, message: &str) -> ChatReply {
        if message.is_empty() {
            return ChatReply::text("Please provide a message.");
        }
        let Some(provider) = &self.provider else {
            return ChatReply::text(NOT_CONFIGURED);
        };

        let completion = match provider.complete(SYSTEM_PROMPT, message).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "completion request failed");
                return ChatReply::text(format!("Error connecting to OpenAI: {e}"));
            }
        };

        let Some(intent) = extract_intent(&completion) else {
            return ChatReply::text(completion);
        };
        if !USER_TOOLS.contains(&intent.tool.as_str()) {
            tracing::debug!(tool = %intent.tool, "chat intent names a tool outside the user set");
            return ChatReply::text(completion);
        }

        tracing::info!(tool = %intent.tool, "chat dispatching tool call");
        let result = match self.dispatcher.call(&intent.tool, intent.arguments).await {
            Ok(result) => result,
            Err(e) => ToolResult::Failure(e.to_string()),
        };
        let response = format_tool_result(&intent.tool, &result);
        ChatReply {
            response,
            tool_used: Some(intent.tool),
            raw_result: Some(result.into_value()),
        }
    }
}

fn yes_no(value: &Value) -> &'static str {
    let active = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    };
    if active { "Yes" } else { "No" }
}

fn field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "None".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Render a user tool result as chat text.
pub fn format_tool_result(tool: &str, result: &ToolResult) -> String {
    let value = match result {
        ToolResult::Failure(message) => return format!("Error: {message}"),
        ToolResult::Success(value) => value,
    };

    match tool {
        "get_all_users" => {
            let users = value["users"].as_array().map(Vec::as_slice).unwrap_or_default();
            if users.is_empty() {
                return "No users found in the database.".to_string();
            }
            let lines: Vec<String> = users
                .iter()
                .enumerate()
                .map(|(i, user)| {
                    format!(
                        "  {}. {} ({}) - ID: {}, Active: {}",
                        i + 1,
                        field(user, "name"),
                        field(user, "email"),
                        field(user, "id"),
                        yes_no(&user["is_active"]),
                    )
                })
                .collect();
            format!("Found {} user(s):\n{}", users.len(), lines.join("\n"))
        }
        "get_user_by_id" => {
            let user = &value["user"];
            format!(
                "User Details:\n  ID: {}\n  Name: {}\n  Email: {}\n  Role: {}\n  Active: {}\n  Created: {}",
                field(user, "id"),
                field(user, "name"),
                field(user, "email"),
                field(user, "role"),
                yes_no(&user["is_active"]),
                field(user, "created_at"),
            )
        }
        "create_user" => format!("User created successfully with ID: {}", field(value, "id")),
        "update_user" => value["message"]
            .as_str()
            .unwrap_or("User updated successfully")
            .to_string(),
        "delete_user" => value["message"]
            .as_str()
            .unwrap_or("User deleted successfully")
            .to_string(),
        _ => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}
