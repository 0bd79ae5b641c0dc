//! Chat-completion client used to synthesize answers.
//!
//! The client speaks the OpenAI-compatible protocol, which Gemini exposes under
//! `/v1beta/openai`. Requests are single-turn: the caller composes the whole prompt.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Provider could not be reached or rejected the route.
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `prompt` as a single user message and return the model's reply text.
    async fn complete(&self, prompt: &str) -> Result<String, ChatClientError>;
}

/// Chat client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompatibleChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiCompatibleChatClient {
    /// Build a client for `model` at `base_url`, authenticating with `api_key`.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, ChatClientError> {
        let http = Client::builder()
            .user_agent("docqa/chat")
            .build()
            .map_err(|error| ChatClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Model identifier used for completions.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// List model identifiers visible to the configured credential.
    pub async fn list_models(&self) -> Result<Vec<String>, ChatClientError> {
        let response = self
            .http
            .get(self.endpoint("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "model listing returned {status}: {body}"
            )));
        }

        let body: ModelsResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode model list: {error}"))
        })?;
        Ok(body.data.into_iter().map(|entry| entry.id).collect())
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatibleChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let response = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ChatClientError::ProviderUnavailable(format!(
                "endpoint {} returned 404",
                self.endpoint("chat/completions")
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ChatClientError::InvalidResponse("completion had no content".into()))
    }
}

/// Build the chat client described by the configuration.
pub fn build_chat_client(config: &Config) -> Result<Arc<dyn ChatClient>, ChatClientError> {
    Ok(Arc::new(OpenAiCompatibleChatClient::new(
        &config.llm_base_url,
        &config.google_api_key,
        &config.chat_model,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn client_for(server: &MockServer) -> OpenAiCompatibleChatClient {
        OpenAiCompatibleChatClient::new(&server.base_url(), "key-123", "gemini-1.5-flash")
            .expect("client")
    }

    #[tokio::test]
    async fn completion_returns_trimmed_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer key-123")
                    .json_body_partial(r#"{"model":"gemini-1.5-flash"}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "  Paris.\n" } }
                    ]
                }));
            })
            .await;

        let answer = client_for(&server)
            .complete("What is the capital of France?")
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Paris.");
    }

    #[tokio::test]
    async fn completion_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server).complete("hi").await.unwrap_err();
        assert!(
            matches!(error, ChatClientError::GenerationFailed(ref message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn completion_without_content_is_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client_for(&server).complete("hi").await.unwrap_err();
        assert!(matches!(error, ChatClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn list_models_collects_identifiers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models");
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [
                        { "id": "models/gemini-1.5-flash", "object": "model" },
                        { "id": "models/text-embedding-004", "object": "model" }
                    ]
                }));
            })
            .await;

        let models = client_for(&server).list_models().await.expect("models");
        assert_eq!(
            models,
            vec!["models/gemini-1.5-flash", "models/text-embedding-004"]
        );
    }
}
