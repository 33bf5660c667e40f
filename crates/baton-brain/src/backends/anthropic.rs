use crate::brain::{Brain, BrainError, BrainResponse, ChatMessage, ChatRole, FinishReason};
use crate::config::BrainConfig;
use crate::stream::StreamEvent;
use async_trait::async_trait;
use baton_core::{ToolCall, ToolDescriptor};
use futures_util::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API brain.
pub struct AnthropicBrain {
    config: BrainConfig,
    http: reqwest::Client,
}

impl AnthropicBrain {
    pub fn new(config: BrainConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_body(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
        stream: bool,
    ) -> serde_json::Value {
        let api_messages: Vec<ApiMessage> = messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": api_messages,
        });

        if let Some(sys) = system_prompt {
            body["system"] = serde_json::json!(sys);
        }

        if !tools.is_empty() {
            let api_tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters_schema,
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(api_tools);
        }

        if stream {
            body["stream"] = serde_json::json!(true);
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, BrainError> {
        let url = format!("{}/v1/messages", self.config.base_url());
        self.http
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrainError::Timeout(self.config.timeout_secs)
                } else {
                    BrainError::Http(e.to_string())
                }
            })
    }
}

#[async_trait]
impl Brain for AnthropicBrain {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<BrainResponse, BrainError> {
        let body = self.build_body(system_prompt, messages, tools, false);
        let resp = self.post(&body).await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(BrainError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BrainError::Http(e.to_string()))?;

        parse_anthropic_response(&resp_body)
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
        let body = self.build_body(system_prompt, messages, tools, true);
        let resp = self.post(&body).await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(BrainError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let (tx, rx) = mpsc::channel::<StreamEvent>(256);
        let byte_stream = resp.bytes_stream();

        let handle = tokio::spawn(async move {
            let mut stream = byte_stream;
            let mut buffer = String::new();
            let mut full_text = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();
            let mut active_tool_blocks: std::collections::HashMap<u64, (String, String, String)> =
                std::collections::HashMap::new();
            let mut stop_reason = String::from("end_turn");

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Error {
                                message: format!("Stream read error: {e}"),
                            })
                            .await;
                        return Err(BrainError::Http(format!("Stream read error: {e}")));
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };

                    match event["type"].as_str().unwrap_or("") {
                        "content_block_start" => {
                            let index = event["index"].as_u64().unwrap_or(0);
                            let block = &event["content_block"];
                            if block["type"].as_str() == Some("tool_use") {
                                let id = block["id"].as_str().unwrap_or_default().to_string();
                                let name = block["name"].as_str().unwrap_or_default().to_string();
                                active_tool_blocks
                                    .insert(index, (id.clone(), name.clone(), String::new()));
                                let _ = tx.send(StreamEvent::ToolCallStart { id, name }).await;
                            }
                        }

                        "content_block_delta" => {
                            let index = event["index"].as_u64().unwrap_or(0);
                            let delta = &event["delta"];
                            match delta["type"].as_str().unwrap_or("") {
                                "text_delta" => {
                                    if let Some(text) = delta["text"].as_str() {
                                        full_text.push_str(text);
                                        let _ = tx
                                            .send(StreamEvent::TextDelta {
                                                text: text.to_string(),
                                            })
                                            .await;
                                    }
                                }
                                "input_json_delta" => {
                                    if let Some(partial) = delta["partial_json"].as_str() {
                                        if let Some(block) = active_tool_blocks.get_mut(&index) {
                                            block.2.push_str(partial);
                                            let _ = tx
                                                .send(StreamEvent::ToolCallDelta {
                                                    id: block.0.clone(),
                                                    arguments_delta: partial.to_string(),
                                                })
                                                .await;
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }

                        "content_block_stop" => {
                            let index = event["index"].as_u64().unwrap_or(0);
                            if let Some((id, name, args_json)) = active_tool_blocks.remove(&index) {
                                let arguments: serde_json::Value = serde_json::from_str(&args_json)
                                    .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
                                tool_calls.push(ToolCall {
                                    id: id.clone(),
                                    name,
                                    arguments,
                                });
                                let _ = tx.send(StreamEvent::ToolCallEnd { id }).await;
                            }
                        }

                        "message_delta" => {
                            if let Some(sr) = event["delta"]["stop_reason"].as_str() {
                                stop_reason = sr.to_string();
                            }
                        }

                        "message_stop" => {
                            let _ = tx.send(StreamEvent::Done).await;
                        }

                        _ => {}
                    }
                }
            }

            Ok(BrainResponse {
                content: full_text,
                finish_reason: if tool_calls.is_empty() {
                    map_stop_reason(&stop_reason)
                } else {
                    FinishReason::ToolUse
                },
                tool_calls,
            })
        });

        Ok((rx, handle))
    }
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

fn map_stop_reason(stop_reason: &str) -> FinishReason {
    match stop_reason {
        "end_turn" => FinishReason::EndTurn,
        "tool_use" => FinishReason::ToolUse,
        "max_tokens" => FinishReason::Length,
        _ => FinishReason::Other,
    }
}

/// Parses a buffered Messages API response body.
pub fn parse_anthropic_response(body: &serde_json::Value) -> Result<BrainResponse, BrainError> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| BrainError::Malformed("missing content array".to_string()))?;

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t.to_string());
                }
            }
            Some("tool_use") => {
                tool_calls.push(ToolCall {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    arguments: block["input"].clone(),
                });
            }
            _ => {}
        }
    }

    let stop_reason = body["stop_reason"].as_str().unwrap_or("end_turn");
    Ok(BrainResponse {
        content: text_parts.join("\n"),
        finish_reason: if tool_calls.is_empty() {
            map_stop_reason(stop_reason)
        } else {
            FinishReason::ToolUse
        },
        tool_calls,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_response() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "Hello there."}],
            "stop_reason": "end_turn",
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.content, "Hello there.");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
        assert!(resp.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_tool_use_response() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "lookup",
                 "input": {"query": "weather"}},
            ],
            "stop_reason": "tool_use",
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::ToolUse);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "lookup");
        assert_eq!(resp.tool_calls[0].arguments["query"], "weather");
    }

    #[test]
    fn test_parse_truncated_response() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "partial"}],
            "stop_reason": "max_tokens",
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Length);
    }

    #[test]
    fn test_parse_missing_content_is_malformed() {
        let body = serde_json::json!({"stop_reason": "end_turn"});
        let err = parse_anthropic_response(&body).unwrap_err();
        assert!(matches!(err, BrainError::Malformed(_)));
    }
}
