//! The Baton execution engine: task state, the agent turn loop, handoff
//! routing, breakpoint debugging, streaming, and persistence.
//!
//! The engine is layered. [`TaskState`] is the persisted per-task document;
//! the [`Orchestrator`] drives one turn at a time over injected
//! collaborators; the [`TaskManager`] exposes the public operations and owns
//! the in-memory registry of live tasks.
//!
//! # Main types
//!
//! - [`TaskManager`] — Public task lifecycle operations over a TTL cache.
//! - [`Orchestrator`] — The turn state machine: prompt, brain, gate, tools,
//!   route.
//! - [`TaskState`] / [`ExecutionMode`] — The task document and its run mode.
//! - [`TaskStore`] / [`FileTaskStore`] — Persistence as one JSON doc per task.
//! - [`StreamChunk`] — Token-channel payloads for streaming consumers.

/// Breakpoint phases and tag matching.
pub mod breakpoint;
/// Public task operations and the live-task registry.
pub mod manager;
/// The agent turn state machine.
pub mod orchestrator;
/// System prompt rendering and history flattening.
pub mod prompt;
/// Handoff directive detection and routing.
pub mod router;
/// The per-task state document.
pub mod state;
/// Task persistence.
pub mod store;
/// Consumer-facing stream chunks.
pub mod streaming;

pub use breakpoint::{match_breakpoint, Phase};
pub use manager::{TaskManager, DEFAULT_TASK_TTL};
pub use orchestrator::{Orchestrator, PENDING_HANDOFF, PENDING_TOOL_CALLS};
pub use prompt::{flatten_history, render_system_prompt};
pub use router::{decide, detect_directive, Directive, RouteAction, RouteContext, RouteDecision};
pub use state::{ArtifactEntry, ExecutionMode, TaskState};
pub use store::{FileTaskStore, TaskStore};
pub use streaming::{StepStream, StreamChunk, STREAM_CHANNEL_CAPACITY};
