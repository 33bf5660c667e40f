#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Regression tests for baton-brain: BrainConfig, provider selection, the
//! HTTP backends against a mock server, and retry behaviour.

use baton_brain::{
    build_brain, AnthropicBrain, Brain, BrainConfig, BrainError, BrainProvider, ChatMessage,
    FinishReason, OpenAiBrain, RetryPolicy, RetryingBrain, StreamEvent,
};
use baton_core::BatonError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_config(provider: BrainProvider, base_url: &str) -> BrainConfig {
    BrainConfig {
        provider,
        model_id: "test-model".to_string(),
        api_key: "test-key".to_string(),
        api_base_url: Some(base_url.to_string()),
        temperature: 0.7,
        max_tokens: 256,
        timeout_secs: 5,
        retry: None,
        script: Vec::new(),
    }
}

// --- BrainProvider & BrainConfig ---

#[test]
fn test_provider_serialization() {
    let json_str = serde_json::to_string(&BrainProvider::Scripted).unwrap();
    assert_eq!(json_str, "\"scripted\"");

    let groq: BrainProvider = serde_json::from_str("\"groq\"").unwrap();
    assert!(matches!(groq, BrainProvider::Groq));
}

#[test]
fn test_config_deserialization_with_defaults() {
    let toml_str = r#"
        provider = "anthropic"
        model_id = "test-model"
        api_key = "test-key"
    "#;

    let config: BrainConfig = toml::from_str(toml_str).unwrap();
    assert!(matches!(config.provider, BrainProvider::Anthropic));
    assert_eq!(config.temperature, 0.7); // default
    assert_eq!(config.max_tokens, 4096); // default
    assert_eq!(config.timeout_secs, 120); // default
    assert!(config.retry.is_none());
    assert!(config.script.is_empty());
}

#[test]
fn test_config_base_url_defaults() {
    let mut config = http_config(BrainProvider::Anthropic, "unused");
    config.api_base_url = None;
    assert_eq!(config.base_url(), "https://api.anthropic.com");

    config.provider = BrainProvider::OpenAi;
    assert_eq!(config.base_url(), "https://api.openai.com");

    config.provider = BrainProvider::OpenRouter;
    assert_eq!(config.base_url(), "https://openrouter.ai/api");

    config.provider = BrainProvider::Groq;
    assert_eq!(config.base_url(), "https://api.groq.com/openai");
}

#[test]
fn test_config_base_url_custom_override() {
    let config = http_config(BrainProvider::Anthropic, "http://localhost:8080");
    assert_eq!(config.base_url(), "http://localhost:8080");
}

// --- build_brain ---

#[tokio::test]
async fn test_build_brain_scripted() {
    let config = BrainConfig {
        provider: BrainProvider::Scripted,
        model_id: "scripted".to_string(),
        api_key: String::new(),
        api_base_url: None,
        temperature: 0.7,
        max_tokens: 256,
        timeout_secs: 5,
        retry: None,
        script: vec!["first reply".to_string(), "second reply".to_string()],
    };

    let brain = build_brain(config).unwrap();
    let messages = [ChatMessage::user("hello")];

    let first = brain.chat(None, &messages, &[]).await.unwrap();
    assert_eq!(first.content, "first reply");

    let second = brain.chat(None, &messages, &[]).await.unwrap();
    assert_eq!(second.content, "second reply");
}

#[test]
fn test_build_brain_rejects_missing_api_key() {
    let mut config = http_config(BrainProvider::Anthropic, "http://localhost:1");
    config.api_key = String::new();

    let err = build_brain(config).unwrap_err();
    assert!(matches!(err, BatonError::Config(_)));
}

// --- Anthropic backend against a mock server ---

#[tokio::test]
async fn test_anthropic_chat_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Hello from the mock."}],
            "stop_reason": "end_turn",
        })))
        .mount(&server)
        .await;

    let brain = AnthropicBrain::new(http_config(BrainProvider::Anthropic, &server.uri()));
    let resp = brain
        .chat(Some("You are terse."), &[ChatMessage::user("hi")], &[])
        .await
        .unwrap();

    assert_eq!(resp.content, "Hello from the mock.");
    assert_eq!(resp.finish_reason, FinishReason::EndTurn);
    assert!(resp.tool_calls.is_empty());
}

#[tokio::test]
async fn test_anthropic_chat_tool_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "lookup",
                 "input": {"query": "weather"}},
            ],
            "stop_reason": "tool_use",
        })))
        .mount(&server)
        .await;

    let brain = AnthropicBrain::new(http_config(BrainProvider::Anthropic, &server.uri()));
    let resp = brain.chat(None, &[ChatMessage::user("hi")], &[]).await.unwrap();

    assert_eq!(resp.finish_reason, FinishReason::ToolUse);
    assert_eq!(resp.tool_calls.len(), 1);
    assert_eq!(resp.tool_calls[0].id, "toolu_1");
    assert_eq!(resp.tool_calls[0].name, "lookup");
    assert_eq!(resp.tool_calls[0].arguments["query"], "weather");
}

#[tokio::test]
async fn test_anthropic_chat_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let brain = AnthropicBrain::new(http_config(BrainProvider::Anthropic, &server.uri()));
    let err = brain
        .chat(None, &[ChatMessage::user("hi")], &[])
        .await
        .unwrap_err();

    match err {
        BrainError::Api { status, detail } => {
            assert_eq!(status, 401);
            assert!(detail.contains("invalid x-api-key"));
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_anthropic_chat_stream() {
    let sse_body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n",
        "\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,",
        "\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,",
        "\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,",
        "\"delta\":{\"type\":\"text_delta\",\"text\":\" world\"}}\n",
        "\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
        "\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n",
        "\n",
        "data: {\"type\":\"message_stop\"}\n",
        "\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let brain = AnthropicBrain::new(http_config(BrainProvider::Anthropic, &server.uri()));
    let (mut rx, handle) = brain
        .chat_stream(None, &[ChatMessage::user("hi")], &[])
        .await
        .unwrap();

    let mut deltas = Vec::new();
    let mut saw_done = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => deltas.push(text),
            StreamEvent::Done => saw_done = true,
            other => panic!("Unexpected stream event: {other:?}"),
        }
    }

    assert_eq!(deltas, vec!["Hello", " world"]);
    assert!(saw_done);

    let final_resp = handle.await.unwrap().unwrap();
    assert_eq!(final_resp.content, "Hello world");
    assert_eq!(final_resp.finish_reason, FinishReason::EndTurn);
}

// --- OpenAI-compatible backend against a mock server ---

#[tokio::test]
async fn test_openai_chat_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Mock says hi."},
                "finish_reason": "stop",
            }]
        })))
        .mount(&server)
        .await;

    let brain = OpenAiBrain::new(http_config(BrainProvider::OpenAi, &server.uri()));
    let resp = brain.chat(None, &[ChatMessage::user("hi")], &[]).await.unwrap();

    assert_eq!(resp.content, "Mock says hi.");
    assert_eq!(resp.finish_reason, FinishReason::EndTurn);
}

#[tokio::test]
async fn test_openai_chat_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "lookup",
                            "arguments": "{\"query\":\"weather\"}",
                        },
                    }],
                },
                "finish_reason": "tool_calls",
            }]
        })))
        .mount(&server)
        .await;

    let brain = OpenAiBrain::new(http_config(BrainProvider::OpenAi, &server.uri()));
    let resp = brain.chat(None, &[ChatMessage::user("hi")], &[]).await.unwrap();

    assert_eq!(resp.finish_reason, FinishReason::ToolUse);
    assert_eq!(resp.tool_calls.len(), 1);
    assert_eq!(resp.tool_calls[0].name, "lookup");
    assert_eq!(resp.tool_calls[0].arguments["query"], "weather");
}

#[tokio::test]
async fn test_openai_chat_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let brain = OpenAiBrain::new(http_config(BrainProvider::OpenAi, &server.uri()));
    let err = brain
        .chat(None, &[ChatMessage::user("hi")], &[])
        .await
        .unwrap_err();

    assert!(matches!(err, BrainError::Api { status: 500, .. }));
    assert!(baton_brain::is_retryable(&err));
}

#[tokio::test]
async fn test_openai_chat_stream() {
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n",
        "\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Streaming\"}}]}\n",
        "\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" works\"}}]}\n",
        "\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
        "\n",
        "data: [DONE]\n",
        "\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let brain = OpenAiBrain::new(http_config(BrainProvider::OpenAi, &server.uri()));
    let (mut rx, handle) = brain
        .chat_stream(None, &[ChatMessage::user("hi")], &[])
        .await
        .unwrap();

    let mut deltas = Vec::new();
    let mut saw_done = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => deltas.push(text),
            StreamEvent::Done => saw_done = true,
            other => panic!("Unexpected stream event: {other:?}"),
        }
    }

    assert_eq!(deltas, vec!["Streaming", " works"]);
    assert!(saw_done);

    let final_resp = handle.await.unwrap().unwrap();
    assert_eq!(final_resp.content, "Streaming works");
    assert_eq!(final_resp.finish_reason, FinishReason::EndTurn);
}

// --- Retry behaviour over HTTP ---

#[tokio::test]
async fn test_retry_recovers_from_transient_error() {
    let server = MockServer::start().await;

    // First request hits a 503, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Recovered."}],
            "stop_reason": "end_turn",
        })))
        .mount(&server)
        .await;

    let inner = AnthropicBrain::new(http_config(BrainProvider::Anthropic, &server.uri()));
    let brain = RetryingBrain::new(
        Arc::new(inner),
        RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
        },
    );

    let resp = brain.chat(None, &[ChatMessage::user("hi")], &[]).await.unwrap();
    assert_eq!(resp.content, "Recovered.");
}

#[tokio::test]
async fn test_retry_policy_defaults() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.backoff_base_ms, 500);
    assert_eq!(policy.backoff_max_ms, 30_000);
}
