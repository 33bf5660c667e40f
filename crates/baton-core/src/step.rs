use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Reserved producer name for human-authored steps.
pub const USER_AGENT: &str = "user";

/// Reserved producer name for steps recording tool execution results.
pub const TOOL_EXECUTOR_AGENT: &str = "tool_executor";

/// One part of a [`TaskStep`].
///
/// Serialized as a tagged union with snake_case `type` tags and camelCase
/// field names, matching the persisted history format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StepPart {
    /// Plain text produced by an agent or the user.
    Text {
        /// The text content.
        text: String,
    },

    /// A tool invocation requested by an agent.
    ToolCall {
        /// Identifier assigned to this call by the producing brain.
        id: String,
        /// Name of the tool to invoke.
        tool_name: String,
        /// JSON arguments for the tool.
        args: serde_json::Value,
    },

    /// The outcome of executing a tool call.
    ToolResult {
        /// The id of the [`StepPart::ToolCall`] this result answers.
        call_id: String,
        /// Textual output produced by the tool.
        result: String,
        /// Whether the execution ended in an error.
        is_error: bool,
    },

    /// A named artifact produced during the task.
    Artifact {
        /// Artifact name; later artifacts with the same name win.
        name: String,
        /// Artifact content.
        content: String,
        /// Arbitrary metadata attached by the producer.
        metadata: HashMap<String, serde_json::Value>,
    },

    /// A guardrail verdict recorded against this step's content.
    Guardrail {
        /// Verdict status (`pass`, `flagged`, `blocked`).
        status: String,
        /// The individual checks performed, as serialized check records.
        checks: Vec<serde_json::Value>,
    },
}

/// One immutable unit of task history: a single turn contribution.
///
/// Steps are totally ordered by their position in `TaskState.history`, never
/// by `timestamp` — clock skew must not reorder history. Once appended a step
/// is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    /// Unique identifier for this step.
    pub step_id: Uuid,
    /// Producer identity: an agent name, [`USER_AGENT`], or
    /// [`TOOL_EXECUTOR_AGENT`].
    pub agent_name: String,
    /// UTC timestamp of when the step was created. Informational only.
    pub timestamp: DateTime<Utc>,
    /// Ordered, non-empty sequence of parts.
    pub parts: Vec<StepPart>,
}

impl TaskStep {
    /// Creates a step with a single initial part. The one-part minimum keeps
    /// the non-empty invariant by construction.
    pub fn new(agent_name: impl Into<String>, part: StepPart) -> Self {
        Self {
            step_id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            timestamp: Utc::now(),
            parts: vec![part],
        }
    }

    /// Creates a step from a prepared part list. Returns `None` for an empty
    /// list, which would violate the non-empty invariant.
    pub fn from_parts(agent_name: impl Into<String>, parts: Vec<StepPart>) -> Option<Self> {
        Self::from_parts_with_id(Uuid::new_v4(), agent_name, parts)
    }

    /// Creates a step under a caller-assigned id. Stream chunks carry the
    /// step id before the step itself is assembled, so the id must be
    /// fixable up front.
    pub fn from_parts_with_id(
        step_id: Uuid,
        agent_name: impl Into<String>,
        parts: Vec<StepPart>,
    ) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        Some(Self {
            step_id,
            agent_name: agent_name.into(),
            timestamp: Utc::now(),
            parts,
        })
    }

    /// Appends a further part (builder style).
    pub fn with_part(mut self, part: StepPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Creates a plain text step for the given producer.
    pub fn text(agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(agent_name, StepPart::Text { text: text.into() })
    }

    /// Creates a user-authored text step.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(USER_AGENT, text)
    }

    /// Concatenated content of all [`StepPart::Text`] parts.
    pub fn text_content(&self) -> String {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                StepPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        texts.join("\n")
    }

    /// Whether any part is a [`StepPart::ToolCall`].
    pub fn has_tool_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, StepPart::ToolCall { .. }))
    }
}
