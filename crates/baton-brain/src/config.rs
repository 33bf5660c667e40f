use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which language-model API a brain talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrainProvider {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI chat completions API.
    OpenAi,
    /// OpenRouter — OpenAI-compatible, many models behind one endpoint.
    OpenRouter,
    /// Groq cloud inference — OpenAI-compatible API, free tier with rate limits.
    Groq,
    /// Canned responses from config, no network. For demos and CI.
    Scripted,
}

/// Configuration for one brain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    /// Which API to talk to.
    pub provider: BrainProvider,
    /// Provider-side model identifier.
    pub model_id: String,
    /// Required for HTTP providers, unused by `scripted`.
    #[serde(default)]
    pub api_key: String,
    /// Endpoint root override; `None` uses the provider default.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Response token cap per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Hard cutoff for a single model call. This is the only thing that
    /// interrupts an in-flight request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy for transient failures. `None` disables retries.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Responses for the `scripted` provider, consumed front to back.
    #[serde(default)]
    pub script: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    120
}

impl BrainConfig {
    /// The API endpoint root, with provider defaults when not overridden.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                BrainProvider::Anthropic => "https://api.anthropic.com",
                BrainProvider::OpenAi => "https://api.openai.com",
                BrainProvider::OpenRouter => "https://openrouter.ai/api",
                BrainProvider::Groq => "https://api.groq.com/openai",
                BrainProvider::Scripted => "local://scripted",
            }
        }
    }
}
