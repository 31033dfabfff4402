//! Retry wrapper for transient model failures

use super::types::{LlmRequest, LlmResponse, LlmStream};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retries retryable failures with exponential backoff: 1s, 2s, 4s ...
///
/// A provider-supplied `retry_after` replaces the computed delay. For streams
/// only opening the stream is retried; once events flow, failures pass
/// through untouched.
pub struct RetryingService {
    inner: Arc<dyn LlmService>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingService {
    pub fn new(inner: Arc<dyn LlmService>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn retry_delay(&self, attempt: u32, error: &LlmError) -> Duration {
        error
            .retry_after
            .unwrap_or_else(|| self.base_delay * (1 << (attempt.min(16) - 1)))
    }

    async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, LlmError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.kind.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay(attempt, &e);
                    tracing::warn!(
                        model = %self.inner.model_id(),
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = %delay.as_millis(),
                        error = %e.message,
                        "Retrying LLM request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LlmService for RetryingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.with_retries(|| self.inner.complete(request)).await
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.with_retries(|| self.inner.stream(request)).await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
