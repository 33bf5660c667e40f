use crate::backends::anthropic::AnthropicBrain;
use crate::backends::openai::OpenAiBrain;
use crate::backends::scripted::ScriptedBrain;
use crate::config::{BrainConfig, BrainProvider};
use crate::retry::RetryingBrain;
use crate::stream::StreamEvent;
use async_trait::async_trait;
use baton_core::{BatonError, BatonResult, ToolCall, ToolDescriptor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors from a language-model call.
///
/// These never abort a task: the orchestrator converts them into a degraded
/// turn and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    /// Transport failure before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider returned a non-success status.
    #[error("API error {status}: {detail}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider error body, as text.
        detail: String,
    },

    /// The response arrived but could not be interpreted.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The call exceeded the configured time budget.
    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The user, another agent, or a backfilled tool result.
    User,
    /// The agent whose turn is being generated.
    Assistant,
}

/// One message in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant-role message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the assistant turn.
    EndTurn,
    /// The model wants tool results before continuing.
    ToolUse,
    /// The `max_tokens` budget cut generation short.
    Length,
    /// Any provider-specific reason not mapped above.
    Other,
}

/// A complete model response: text, stop reason, and any requested tool calls.
#[derive(Debug, Clone)]
pub struct BrainResponse {
    /// Assembled text content, possibly empty for pure tool-use turns.
    pub content: String,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Tool invocations the model requested, in order.
    pub tool_calls: Vec<ToolCall>,
}

impl BrainResponse {
    /// A plain text response that ends the turn.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: FinishReason::EndTurn,
            tool_calls: Vec::new(),
        }
    }

    /// A response requesting tool execution.
    pub fn tool_use(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            finish_reason: FinishReason::ToolUse,
            tool_calls,
        }
    }

    /// Whether the model requested any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A language-model client.
///
/// Each provider implements this trait to handle API communication. To add a
/// new provider: implement `Brain` in `backends/`, add the variant to
/// [`BrainProvider`], and wire it up in [`build_brain`].
#[async_trait]
pub trait Brain: Send + Sync {
    /// Non-streaming chat completion.
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<BrainResponse, BrainError>;

    /// Streaming chat completion.
    ///
    /// Returns a receiver for incremental events and a join handle that
    /// resolves to the final aggregated response.
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
    >;
}

impl std::fmt::Debug for dyn Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Brain")
    }
}

/// Builds a brain from configuration, wrapping it in retries when a policy
/// is configured.
pub fn build_brain(config: BrainConfig) -> BatonResult<Arc<dyn Brain>> {
    let retry = config.retry.clone();

    let inner: Arc<dyn Brain> = match config.provider {
        BrainProvider::Scripted => Arc::new(ScriptedBrain::from_lines(config.script.clone())),
        BrainProvider::Anthropic => {
            require_api_key(&config)?;
            Arc::new(AnthropicBrain::new(config))
        }
        BrainProvider::OpenAi | BrainProvider::OpenRouter | BrainProvider::Groq => {
            require_api_key(&config)?;
            Arc::new(OpenAiBrain::new(config))
        }
    };

    Ok(match retry {
        Some(policy) => Arc::new(RetryingBrain::new(inner, policy)),
        None => inner,
    })
}

fn require_api_key(config: &BrainConfig) -> BatonResult<()> {
    if config.api_key.is_empty() {
        return Err(BatonError::Config(format!(
            "Provider requires an api_key: {:?}",
            config.provider
        )));
    }
    Ok(())
}
