use crate::brain::{Brain, BrainError, BrainResponse, ChatMessage, ChatRole, FinishReason};
use crate::config::{BrainConfig, BrainProvider};
use crate::stream::StreamEvent;
use async_trait::async_trait;
use baton_core::{ToolCall, ToolDescriptor};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// OpenAI-compatible chat completions brain.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider that
/// implements the OpenAI chat completions API.
pub struct OpenAiBrain {
    config: BrainConfig,
    http: reqwest::Client,
}

impl OpenAiBrain {
    pub fn new(config: BrainConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
    ) -> Vec<serde_json::Value> {
        let mut api_messages: Vec<serde_json::Value> = Vec::new();

        if let Some(sys) = system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys,
            }));
        }

        for m in messages {
            api_messages.push(serde_json::json!({
                "role": match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                "content": m.content,
            }));
        }

        api_messages
    }

    fn build_tools(&self, tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }

    fn build_body(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
        stream: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(system_prompt, messages),
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::json!(self.build_tools(tools));
        }
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, BrainError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let mut request = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter asks clients to identify themselves
        if matches!(self.config.provider, BrainProvider::OpenRouter) {
            request = request.header("X-Title", "Baton");
        }

        request.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                BrainError::Timeout(self.config.timeout_secs)
            } else {
                BrainError::Http(e.to_string())
            }
        })
    }
}

#[async_trait]
impl Brain for OpenAiBrain {
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

        parse_openai_response(&resp_body)
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
            let mut tool_call_map: std::collections::HashMap<u64, (String, String, String)> =
                std::collections::HashMap::new();
            let mut finish_reason = String::from("stop");

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
                    if data == "[DONE]" {
                        let _ = tx.send(StreamEvent::Done).await;
                        continue;
                    }

                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };

                    let choice = &event["choices"][0];

                    if let Some(fr) = choice["finish_reason"].as_str() {
                        finish_reason = fr.to_string();
                        if fr == "tool_calls" {
                            for (id, _name, _args) in tool_call_map.values() {
                                let _ = tx.send(StreamEvent::ToolCallEnd { id: id.clone() }).await;
                            }
                        }
                        continue;
                    }

                    let delta = &choice["delta"];

                    if let Some(content) = delta["content"].as_str() {
                        if !content.is_empty() {
                            full_text.push_str(content);
                            let _ = tx
                                .send(StreamEvent::TextDelta {
                                    text: content.to_string(),
                                })
                                .await;
                        }
                    }

                    if let Some(tc_array) = delta["tool_calls"].as_array() {
                        for tc in tc_array {
                            let idx = tc["index"].as_u64().unwrap_or(0);

                            if let Some(id) = tc["id"].as_str() {
                                let name = tc["function"]["name"]
                                    .as_str()
                                    .unwrap_or_default()
                                    .to_string();
                                tool_call_map
                                    .insert(idx, (id.to_string(), name.clone(), String::new()));
                                let _ = tx
                                    .send(StreamEvent::ToolCallStart {
                                        id: id.to_string(),
                                        name,
                                    })
                                    .await;
                            }

                            if let Some(args_delta) = tc["function"]["arguments"].as_str() {
                                if !args_delta.is_empty() {
                                    if let Some(entry) = tool_call_map.get_mut(&idx) {
                                        entry.2.push_str(args_delta);
                                        let _ = tx
                                            .send(StreamEvent::ToolCallDelta {
                                                id: entry.0.clone(),
                                                arguments_delta: args_delta.to_string(),
                                            })
                                            .await;
                                    }
                                }
                            }
                        }
                    }
                }
            }

            let tool_calls: Vec<ToolCall> = tool_call_map
                .into_values()
                .map(|(id, name, args_json)| ToolCall {
                    id,
                    name,
                    arguments: serde_json::from_str(&args_json).unwrap_or_default(),
                })
                .collect();

            Ok(BrainResponse {
                content: full_text,
                finish_reason: if tool_calls.is_empty() {
                    map_finish_reason(&finish_reason)
                } else {
                    FinishReason::ToolUse
                },
                tool_calls,
            })
        });

        Ok((rx, handle))
    }
}

fn map_finish_reason(finish_reason: &str) -> FinishReason {
    match finish_reason {
        "stop" => FinishReason::EndTurn,
        "tool_calls" => FinishReason::ToolUse,
        "length" => FinishReason::Length,
        _ => FinishReason::Other,
    }
}

/// Parses a buffered chat completions response body.
pub fn parse_openai_response(body: &serde_json::Value) -> Result<BrainResponse, BrainError> {
    let choice = &body["choices"][0];
    let message = &choice["message"];
    if message.is_null() {
        return Err(BrainError::Malformed("missing choices[0].message".to_string()));
    }
    let content = message["content"].as_str().unwrap_or_default().to_string();

    if let Some(tool_calls_json) = message["tool_calls"].as_array() {
        let tool_calls: Vec<ToolCall> = tool_calls_json
            .iter()
            .filter_map(|tc| {
                let id = tc["id"].as_str()?.to_string();
                let name = tc["function"]["name"].as_str()?.to_string();
                let arguments: serde_json::Value =
                    serde_json::from_str(tc["function"]["arguments"].as_str()?).unwrap_or_default();
                Some(ToolCall {
                    id,
                    name,
                    arguments,
                })
            })
            .collect();

        Ok(BrainResponse {
            content,
            finish_reason: FinishReason::ToolUse,
            tool_calls,
        })
    } else {
        let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop");
        Ok(BrainResponse {
            content,
            finish_reason: map_finish_reason(finish_reason),
            tool_calls: Vec::new(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_response() {
        let body = serde_json::json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hi."},
                "finish_reason": "stop",
            }]
        });
        let resp = parse_openai_response(&body).unwrap();
        assert_eq!(resp.content, "Hi.");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
    }

    #[test]
    fn test_parse_tool_calls_response() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"},
                    }],
                },
                "finish_reason": "tool_calls",
            }]
        });
        let resp = parse_openai_response(&body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::ToolUse);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].arguments["q"], "x");
    }

    #[test]
    fn test_parse_empty_body_is_malformed() {
        let err = parse_openai_response(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, BrainError::Malformed(_)));
    }

    #[test]
    fn test_length_finish_reason() {
        let body = serde_json::json!({
            "choices": [{
                "message": {"role": "assistant", "content": "cut off"},
                "finish_reason": "length",
            }]
        });
        let resp = parse_openai_response(&body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Length);
    }
}
