//! Ollama chat backend
//!
//! Talks to a locally hosted Ollama server: `GET /api/tags` for model
//! discovery and `POST /api/chat` (non-streaming) for completions.

use super::types::{ChatReply, ChatRequest};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Default Ollama endpoint
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama service implementation
pub struct OllamaService {
    client: Client,
    base_url: String,
}

impl OllamaService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn read_body(response: reqwest::Response) -> Result<String, LlmError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(LlmError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl LlmService for OllamaService {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;
        let body = Self::read_body(response).await?;

        let tags: TagsResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse model list: {e} - body: {body}"))
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;
        let body = Self::read_body(response).await?;

        // Unparseable bodies degrade to an empty reply rather than an error
        let value: Value = serde_json::from_str(&body).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Chat response was not valid JSON");
            Value::Null
        });
        Ok(ChatReply::from_value(&value))
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
