/// Anthropic Messages API client.
pub mod anthropic;
/// OpenAI-compatible chat completions client.
pub mod openai;
/// Deterministic queue-backed client for tests and demos.
pub mod scripted;
