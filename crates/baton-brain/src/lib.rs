//! Language-model clients for the Baton orchestrator.
//!
//! Every agent turn goes through a [`Brain`]: one request carrying the
//! system prompt, the flattened conversation and the available tool
//! descriptors, answered either in one piece ([`Brain::chat`]) or as an
//! incremental token stream ([`Brain::chat_stream`]).
//!
//! # Main types
//!
//! - [`Brain`] — Provider-agnostic chat trait.
//! - [`BrainConfig`] / [`BrainProvider`] — Declarative backend selection.
//! - [`build_brain`] — Config to boxed client, with retry wrapping.
//! - [`AnthropicBrain`] / [`OpenAiBrain`] — HTTP backends.
//! - [`ScriptedBrain`] — Deterministic queue-backed client for tests.
//! - [`RetryingBrain`] — Exponential-backoff wrapper for transient errors.

/// Provider backends.
pub mod backends;
/// The `Brain` trait and its request/response types.
pub mod brain;
/// Backend configuration.
pub mod config;
/// Retry policy and wrapper.
pub mod retry;
/// Incremental stream events.
pub mod stream;

pub use backends::anthropic::AnthropicBrain;
pub use backends::openai::OpenAiBrain;
pub use backends::scripted::ScriptedBrain;
pub use brain::{
    build_brain, Brain, BrainError, BrainResponse, ChatMessage, ChatRole, FinishReason,
};
pub use config::{BrainConfig, BrainProvider};
pub use retry::{is_retryable, RetryPolicy, RetryingBrain};
pub use stream::StreamEvent;
