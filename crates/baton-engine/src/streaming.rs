use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Bound on the chunk channel handed to a streaming consumer. A slow
/// consumer backpressures the driving loop instead of growing a queue.
pub const STREAM_CHANNEL_CAPACITY: usize = 256;

/// One unit on the token channel of the dual-channel streaming design.
///
/// Chunks carry the id of the step they will become part of, so a consumer
/// can correlate them with the persisted history and with lifecycle events
/// on the [`EventBus`](baton_core::EventBus) channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamChunk {
    /// A fragment of agent text, in generation order.
    ContentChunk {
        /// Id of the step this text will be persisted under.
        step_id: Uuid,
        /// Agent producing the text.
        agent_name: String,
        /// The text fragment.
        text: String,
        /// Always `false` for content chunks.
        is_final: bool,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// The stream for this step failed. Terminal: nothing follows.
    StreamError {
        /// Id of the step whose stream failed.
        step_id: Uuid,
        /// Agent whose turn was streaming.
        agent_name: String,
        /// Human-readable failure description.
        error_message: String,
        /// Always `true`.
        is_final: bool,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// The step finished cleanly. Terminal: nothing follows.
    StreamComplete {
        /// Id of the completed step.
        step_id: Uuid,
        /// Agent whose turn finished.
        agent_name: String,
        /// Always `true`.
        is_final: bool,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
}

impl StreamChunk {
    /// A non-final content fragment.
    pub fn content(step_id: Uuid, agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::ContentChunk {
            step_id,
            agent_name: agent_name.into(),
            text: text.into(),
            is_final: false,
            timestamp: Utc::now(),
        }
    }

    /// The error terminal for a step.
    pub fn error(step_id: Uuid, agent_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StreamError {
            step_id,
            agent_name: agent_name.into(),
            error_message: message.into(),
            is_final: true,
            timestamp: Utc::now(),
        }
    }

    /// The success terminal for a step.
    pub fn complete(step_id: Uuid, agent_name: impl Into<String>) -> Self {
        Self::StreamComplete {
            step_id,
            agent_name: agent_name.into(),
            is_final: true,
            timestamp: Utc::now(),
        }
    }

    /// The step this chunk belongs to.
    pub fn step_id(&self) -> Uuid {
        match self {
            Self::ContentChunk { step_id, .. }
            | Self::StreamError { step_id, .. }
            | Self::StreamComplete { step_id, .. } => *step_id,
        }
    }

    /// Whether this chunk ends its step's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamError { .. } | Self::StreamComplete { .. })
    }
}

/// Per-step writer over the shared chunk channel.
///
/// Enforces the stream contract for one step: at most one terminal chunk,
/// and silence after the consumer hangs up. A hung-up consumer is detected
/// by a failed send and never fails the turn itself.
pub struct StepStream {
    tx: mpsc::Sender<StreamChunk>,
    step_id: Uuid,
    agent_name: String,
    closed: bool,
    terminal_sent: bool,
}

impl StepStream {
    /// Creates a writer for one step over `tx`.
    pub fn new(tx: mpsc::Sender<StreamChunk>, step_id: Uuid, agent_name: impl Into<String>) -> Self {
        Self {
            tx,
            step_id,
            agent_name: agent_name.into(),
            closed: false,
            terminal_sent: false,
        }
    }

    /// Emits a content fragment. Ignored after a terminal or a hang-up.
    pub async fn text(&mut self, text: &str) {
        if self.terminal_sent {
            return;
        }
        let chunk = StreamChunk::content(self.step_id, self.agent_name.clone(), text);
        self.send(chunk).await;
    }

    /// Emits the success terminal, once.
    pub async fn complete(&mut self) {
        if self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        let chunk = StreamChunk::complete(self.step_id, self.agent_name.clone());
        self.send(chunk).await;
    }

    /// Emits the error terminal, once.
    pub async fn fail(&mut self, message: &str) {
        if self.terminal_sent {
            return;
        }
        self.terminal_sent = true;
        let chunk = StreamChunk::error(self.step_id, self.agent_name.clone(), message);
        self.send(chunk).await;
    }

    /// Whether the consumer has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn send(&mut self, chunk: StreamChunk) {
        if self.closed {
            return;
        }
        if self.tx.send(chunk).await.is_err() {
            self.closed = true;
        }
    }
}
