//! LLM provider abstraction
//!
//! Provides a common interface for the model backend. The concrete client is
//! built once at process start and shared by every run.

mod error;
mod openai;
mod retry;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{LlmError, LlmErrorKind};
pub use openai::{OpenAiCompatService, DEFAULT_BASE_URL};
pub use retry::RetryingService;
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Make a streaming request. Backends without native streaming replay
    /// their batch response.
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let response = self.complete(request).await?;
        Ok(events_to_stream(
            response.into_events().into_iter().map(Ok).collect(),
        ))
    }

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls = response.tool_calls.len(),
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let start = std::time::Instant::now();
        let model = self.model_id.clone();
        match self.inner.stream(request).await {
            Ok(events) => {
                tracing::debug!(
                    model = %model,
                    messages = request.messages.len(),
                    "LLM stream opened"
                );
                Ok(events
                    .inspect(move |event| match event {
                        Ok(LlmStreamEvent::End { usage, .. }) => {
                            tracing::info!(
                                model = %model,
                                duration_ms = %start.elapsed().as_millis(),
                                input_tokens = usage.input_tokens,
                                output_tokens = usage.output_tokens,
                                "LLM stream completed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                model = %model,
                                duration_ms = %start.elapsed().as_millis(),
                                error = %e.message,
                                "LLM stream failed"
                            );
                        }
                        Ok(_) => {}
                    })
                    .boxed())
            }
            Err(e) => {
                tracing::error!(
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM stream request failed"
                );
                Err(e)
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
