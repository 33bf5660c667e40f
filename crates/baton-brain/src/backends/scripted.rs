use crate::brain::{Brain, BrainError, BrainResponse, ChatMessage};
use crate::stream::StreamEvent;
use async_trait::async_trait;
use baton_core::ToolDescriptor;
use std::collections::VecDeque;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const EXHAUSTED_REPLY: &str = "I have nothing further to add.";

/// A brain that replays queued responses in order. No network.
///
/// Used in tests and when a team config sets `provider = "scripted"`. When
/// the queue runs dry it answers with a fixed closing line, so a scripted
/// conversation always terminates.
pub struct ScriptedBrain {
    script: Mutex<VecDeque<Result<BrainResponse, BrainError>>>,
}

impl ScriptedBrain {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Builds a script of plain text responses.
    pub fn from_lines(lines: impl IntoIterator<Item = String>) -> Self {
        let script = lines
            .into_iter()
            .map(|line| Ok(BrainResponse::text(line)))
            .collect();
        Self {
            script: Mutex::new(script),
        }
    }

    /// Queues a response.
    pub async fn push_response(&self, response: BrainResponse) {
        self.script.lock().await.push_back(Ok(response));
    }

    /// Queues a failure for the next call.
    pub async fn push_error(&self, error: BrainError) {
        self.script.lock().await.push_back(Err(error));
    }

    /// Responses still queued.
    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }

    async fn next(&self) -> Result<BrainResponse, BrainError> {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(BrainResponse::text(EXHAUSTED_REPLY)))
    }
}

impl Default for ScriptedBrain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brain for ScriptedBrain {
    async fn chat(
        &self,
        _system_prompt: Option<&str>,
        _messages: &[ChatMessage],
        _tools: &[ToolDescriptor],
    ) -> Result<BrainResponse, BrainError> {
        self.next().await
    }

    async fn chat_stream(
        &self,
        _system_prompt: Option<&str>,
        _messages: &[ChatMessage],
        _tools: &[ToolDescriptor],
    ) -> Result<
        (
            mpsc::Receiver<StreamEvent>,
            JoinHandle<Result<BrainResponse, BrainError>>,
        ),
        BrainError,
    > {
        let response = self.next().await?;

        let (tx, rx) = mpsc::channel::<StreamEvent>(256);
        let handle = tokio::spawn(async move {
            // Whitespace-inclusive split keeps the reassembled text identical
            // to the scripted content.
            for piece in response.content.split_inclusive(char::is_whitespace) {
                let _ = tx
                    .send(StreamEvent::TextDelta {
                        text: piece.to_string(),
                    })
                    .await;
            }
            for call in &response.tool_calls {
                let _ = tx
                    .send(StreamEvent::ToolCallStart {
                        id: call.id.clone(),
                        name: call.name.clone(),
                    })
                    .await;
                let _ = tx
                    .send(StreamEvent::ToolCallEnd {
                        id: call.id.clone(),
                    })
                    .await;
            }
            let _ = tx.send(StreamEvent::Done).await;
            Ok(response)
        });

        Ok((rx, handle))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plays_responses_in_order() {
        let brain = ScriptedBrain::from_lines(vec!["one".to_string(), "two".to_string()]);
        assert_eq!(brain.chat(None, &[], &[]).await.unwrap().content, "one");
        assert_eq!(brain.chat(None, &[], &[]).await.unwrap().content, "two");
        assert_eq!(brain.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_exhausted_queue_terminates() {
        let brain = ScriptedBrain::new();
        let resp = brain.chat(None, &[], &[]).await.unwrap();
        assert_eq!(resp.content, EXHAUSTED_REPLY);
    }

    #[tokio::test]
    async fn test_queued_error_surfaces() {
        let brain = ScriptedBrain::new();
        brain
            .push_error(BrainError::Api {
                status: 500,
                detail: "boom".to_string(),
            })
            .await;
        let err = brain.chat(None, &[], &[]).await.unwrap_err();
        assert!(matches!(err, BrainError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_stream_reassembles_exactly() {
        let brain = ScriptedBrain::from_lines(vec!["a short  streamed reply\n".to_string()]);
        let (mut rx, handle) = brain.chat_stream(None, &[], &[]).await.unwrap();

        let mut assembled = String::new();
        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta { text } => assembled.push_str(&text),
                StreamEvent::Done => saw_done = true,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert!(saw_done);
        assert_eq!(assembled, "a short  streamed reply\n");

        let final_resp = handle.await.unwrap().unwrap();
        assert_eq!(final_resp.content, assembled);
    }

    #[tokio::test]
    async fn test_stream_error_returned_up_front() {
        let brain = ScriptedBrain::new();
        brain.push_error(BrainError::Timeout(5)).await;
        let err = brain.chat_stream(None, &[], &[]).await.err().unwrap();
        assert!(matches!(err, BrainError::Timeout(5)));
    }
}
