use crate::brain::{Brain, BrainError, BrainResponse, ChatMessage};
use crate::stream::StreamEvent;
use async_trait::async_trait;
use baton_core::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Configures retry behaviour for transient model-call failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Determines whether an error is transient and worth retrying.
///
/// Transport failures, timeouts, rate limits (429), request timeouts (408)
/// and server errors (5xx) are retryable. Other API statuses and malformed
/// responses are not expected to succeed on retry.
pub fn is_retryable(err: &BrainError) -> bool {
    match err {
        BrainError::Http(_) | BrainError::Timeout(_) => true,
        BrainError::Api { status, .. } => *status == 429 || *status == 408 || *status >= 500,
        BrainError::Malformed(_) => false,
    }
}

/// Computes the backoff delay for a given attempt using exponential backoff
/// capped at `backoff_max_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// A [`Brain`] wrapper that retries transient failures with exponential
/// backoff.
///
/// Within each request it retries up to `max_retries` times for retryable
/// errors; a non-retryable error is returned immediately. For the streaming
/// path only stream establishment is retried, never a stream that has
/// already started delivering events.
pub struct RetryingBrain {
    inner: Arc<dyn Brain>,
    policy: RetryPolicy,
}

impl RetryingBrain {
    /// Wraps `inner` with the given retry policy.
    pub fn new(inner: Arc<dyn Brain>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn backoff(&self, attempt: u32, err: &BrainError) {
        let delay = compute_backoff(&self.policy, attempt);
        info!(attempt, delay_ms = delay, error = %err, "Retryable brain error, backing off");
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
}

#[async_trait]
impl Brain for RetryingBrain {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<BrainResponse, BrainError> {
        let mut attempt = 0;
        loop {
            match self.inner.chat(system_prompt, messages, tools).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if !is_retryable(&e) || attempt >= self.policy.max_retries {
                        return Err(e);
                    }
                    self.backoff(attempt, &e).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn chat_stream(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<
        (
            mpsc::Receiver<StreamEvent>,
            JoinHandle<Result<BrainResponse, BrainError>>,
        ),
        BrainError,
    > {
        let mut attempt = 0;
        loop {
            match self.inner.chat_stream(system_prompt, messages, tools).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable(&e) || attempt >= self.policy.max_retries {
                        return Err(e);
                    }
                    self.backoff(attempt, &e).await;
                    attempt += 1;
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
