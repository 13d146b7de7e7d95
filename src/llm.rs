//! Language backend abstraction
//!
//! Model discovery and chat completion against a local model server, plus
//! the optional dedicated contradiction classifier.

mod error;
mod ollama;
pub mod predictor;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use ollama::{OllamaService, DEFAULT_BASE_URL};
pub use predictor::{HttpPredictor, PredictRequest, PredictorService};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for chat backends
#[async_trait]
pub trait LlmService: Send + Sync {
    /// List the model names the backend serves
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;

    /// Make a non-streaming chat completion request
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LlmError>;

    /// Base URL, for logs
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        (**self).list_models().await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LlmError> {
        (**self).chat(request).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Logging wrapper for chat backends
pub struct LoggingService<S> {
    inner: S,
}

impl<S: LlmService> LoggingService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: LlmService> LlmService for LoggingService<S> {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.list_models().await;
        let duration = start.elapsed();

        match &result {
            Ok(models) => {
                tracing::info!(
                    endpoint = %self.inner.endpoint(),
                    duration_ms = %duration.as_millis(),
                    count = models.len(),
                    "Model listing completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    endpoint = %self.inner.endpoint(),
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Model listing failed"
                );
            }
        }

        result
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.chat(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    model = %request.model,
                    duration_ms = %duration.as_millis(),
                    messages = request.messages.len(),
                    has_content = reply.content.is_some(),
                    "Chat request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %request.model,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Chat request failed"
                );
            }
        }

        result
    }

    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }
}
