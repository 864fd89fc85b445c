//! Rate-limited, retrying model decorator.

use crate::error::{ModelError, ModelResult};
use crate::llm::retry::RetryPolicy;
use crate::llm::traits::LanguageModel;
use crate::security::RateLimiter;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Wraps a [`LanguageModel`] so every attempt first takes a token from the
/// shared [`RateLimiter`], and transient failures are retried per
/// [`RetryPolicy`].
pub struct MeteredModel {
    inner: Arc<dyn LanguageModel>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    acquire_deadline: Option<Duration>,
}

impl MeteredModel {
    pub fn new(inner: Arc<dyn LanguageModel>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            inner,
            limiter,
            retry: RetryPolicy::default(),
            acquire_deadline: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound the wait for a rate-limit token. Without a deadline callers wait
    /// as long as the limiter stays saturated.
    pub fn with_acquire_deadline(mut self, deadline: Duration) -> Self {
        self.acquire_deadline = Some(deadline);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn permit(&self) -> ModelResult<()> {
        match self.acquire_deadline {
            Some(deadline) => self
                .limiter
                .acquire_timeout(deadline)
                .await
                .map_err(|_| ModelError::Throttled(deadline.as_millis() as u64)),
            None => {
                self.limiter.acquire().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl LanguageModel for MeteredModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn generate_text(&self, prompt: &str) -> ModelResult<String> {
        self.retry
            .run("generate_text", || async move {
                self.permit().await?;
                let text = self.inner.generate_text(prompt).await?;
                if text.trim().is_empty() {
                    return Err(ModelError::EmptyResponse);
                }
                debug!("Generated {} chars", text.len());
                Ok(text)
            })
            .await
    }

    #[instrument(skip_all, fields(text_len = text.len()))]
    async fn generate_embedding(&self, text: &str) -> ModelResult<Vec<f32>> {
        self.retry
            .run("generate_embedding", || async move {
                self.permit().await?;
                let embedding = self.inner.generate_embedding(text).await?;
                if embedding.is_empty() {
                    return Err(ModelError::EmptyResponse);
                }
                Ok(embedding)
            })
            .await
    }
}
