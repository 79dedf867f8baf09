/// Completion collaborator for the chat endpoint.
///
/// `CompletionProvider` is the seam; `OpenAiCompatClient` talks to any
/// OpenAI-compatible `/chat/completions` API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::LlmSettings;

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 500;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Produces a free-text completion for a system prompt plus one user message.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [RequestMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(settings: &LlmSettings, client: reqwest::Client) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
            client,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: [
                RequestMessage {
                    role: "system",
                    content: system,
                },
                RequestMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        tracing::debug!(%status, model = %self.model, "completion API response");

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::Auth(format!(
                "completion API rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(LlmError::Request(format!("completion API error {status}: {text}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(format!("parse failed: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default().trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(base_url: String) -> OpenAiCompatClient {
        let settings = LlmSettings {
            api_key: "sk-test".to_string(),
            base_url,
            model: "gpt-3.5-turbo".to_string(),
        };
        OpenAiCompatClient::new(&settings, reqwest::Client::new())
    }

    #[tokio::test]
    async fn completion_sends_prompt_and_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 500,
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "hello" }
                ]
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  hi there \n"}}]}"#)
            .create_async()
            .await;

        let reply = client(server.url()).complete("sys", "hello").await.unwrap();
        mock.assert_async().await;
        assert_eq!(reply, "hi there");
    }

    #[tokio::test]
    async fn rejected_key_is_an_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("{}")
            .create_async()
            .await;

        let err = client(server.url()).complete("sys", "hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)), "{err}");
    }
}
