use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle event types produced and consumed by the orchestrator.
///
/// Serialized with the dotted wire names (`task.started`, `agent.handoff`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A task was created and entered the running state.
    #[serde(rename = "task.started")]
    TaskStarted,
    /// A task reached completion (routing, round limit, or single-agent end).
    #[serde(rename = "task.completed")]
    TaskCompleted,
    /// A task was paused (explicitly, by breakpoint, or by step-through mode).
    #[serde(rename = "task.paused")]
    TaskPaused,
    /// A paused task was resumed.
    #[serde(rename = "task.resumed")]
    TaskResumed,
    /// An agent turn is starting.
    #[serde(rename = "agent.start")]
    AgentStart,
    /// An agent turn completed and its step was appended.
    #[serde(rename = "agent.complete")]
    AgentComplete,
    /// Conversational control transferred to another agent.
    #[serde(rename = "agent.handoff")]
    AgentHandoff,
    /// A breakpoint matched the current execution phase.
    #[serde(rename = "breakpoint.hit")]
    BreakpointHit,
    /// A recoverable in-loop failure (brain call, tool execution).
    #[serde(rename = "error")]
    Error,
}

impl EventKind {
    /// The dotted wire name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task.started",
            EventKind::TaskCompleted => "task.completed",
            EventKind::TaskPaused => "task.paused",
            EventKind::TaskResumed => "task.resumed",
            EventKind::AgentStart => "agent.start",
            EventKind::AgentComplete => "agent.complete",
            EventKind::AgentHandoff => "agent.handoff",
            EventKind::BreakpointHit => "breakpoint.hit",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event. Fire-and-forget, at-most-once per emission call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// What happened.
    pub event_type: EventKind,
    /// UTC timestamp of emission.
    pub timestamp: DateTime<Utc>,
    /// Emitting component (e.g. `"orchestrator"`).
    pub source: String,
    /// The task this event belongs to.
    pub correlation_id: Uuid,
    /// Free-form payload.
    pub data: serde_json::Value,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new(
        event_type: EventKind,
        source: impl Into<String>,
        correlation_id: Uuid,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            source: source.into(),
            correlation_id,
            data,
        }
    }
}
