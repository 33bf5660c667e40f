//! Core types and error definitions for the Baton orchestrator.
//!
//! This crate provides the foundational types shared across all Baton crates:
//! error handling, the append-only step model, lifecycle events and their
//! fan-out bus, tool call abstractions, and the static team topology.
//!
//! # Main types
//!
//! - [`BatonError`] — Unified error enum for all Baton subsystems.
//! - [`BatonResult`] — Convenience alias for `Result<T, BatonError>`.
//! - [`TaskStep`] / [`StepPart`] — One immutable unit of task history.
//! - [`Event`] / [`EventKind`] — A lifecycle event and its dotted wire name.
//! - [`EventBus`] — Publish/subscribe fan-out with bounded in-memory history.
//! - [`ToolCall`] / [`ToolResult`] / [`ToolRegistry`] — Tool invocation plumbing.
//! - [`Team`] — Read-only agent topology and handoff rules.

/// Publish/subscribe event fan-out.
pub mod bus;
/// Error types.
pub mod error;
/// Lifecycle event types.
pub mod event;
/// Task step and step part model.
pub mod step;
/// Team topology and TOML loading.
pub mod team;
/// Tool call types and the tool registry.
pub mod tool;

pub use bus::{EventBus, EventListener, SubscriptionId};
pub use error::{BatonError, BatonResult};
pub use event::{Event, EventKind};
pub use step::{StepPart, TaskStep, TOOL_EXECUTOR_AGENT, USER_AGENT};
pub use team::{AgentConfig, HandoffRule, Team};
pub use tool::{ToolCall, ToolDescriptor, ToolExecutor, ToolRegistry, ToolResult};
