use crate::verdict::GuardrailResult;

/// Gate for content entering task history.
///
/// Implementations must be cheap and synchronous: the orchestrator invokes
/// the gate inline once per produced response, after full assembly in the
/// streaming path, never per chunk.
pub trait Guardrail: Send + Sync {
    /// Evaluates one piece of content attributed to `agent_name`.
    fn check(&self, content: &str, agent_name: &str) -> GuardrailResult;
}

/// A gate that passes everything. For tests and fully trusted deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllGuardrail;

impl Guardrail for AllowAllGuardrail {
    fn check(&self, _content: &str, _agent_name: &str) -> GuardrailResult {
        GuardrailResult::pass()
    }
}
