//! Content guardrails for the Baton orchestrator.
//!
//! Every agent-produced response passes through a [`Guardrail`] before it is
//! appended to task history; a `blocked` verdict redacts the text. Input
//! prompts are gated at task start.
//!
//! # Main types
//!
//! - [`Guardrail`] — The gate trait: content plus agent name in, verdict out.
//! - [`GuardrailResult`] — A verdict with its individual check records.
//! - [`RuleGuardrail`] — Length, control-character and regex-policy checks.
//! - [`AllowAllGuardrail`] — A no-op gate for tests and trusted setups.

/// Guardrail trait and trivial implementations.
pub mod guard;
/// Rule-driven guardrail with configurable regex policies.
pub mod rules;
/// Verdict types and the redaction notice.
pub mod verdict;

pub use guard::{AllowAllGuardrail, Guardrail};
pub use rules::{GuardrailConfig, PolicyAction, PolicyConfig, RuleGuardrail};
pub use verdict::{redaction_notice, GuardrailCheck, GuardrailResult, GuardrailStatus};
