use baton_core::StepPart;
use serde::{Deserialize, Serialize};

/// Overall verdict of a guardrail evaluation.
///
/// Variant order is severity order, so the strictest of several checks can
/// be taken with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailStatus {
    /// Content is acceptable as-is.
    Pass,
    /// Content is suspicious but allowed through.
    Flagged,
    /// Content must not reach history unredacted.
    Blocked,
}

impl GuardrailStatus {
    /// The wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailStatus::Pass => "pass",
            GuardrailStatus::Flagged => "flagged",
            GuardrailStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for GuardrailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed check within a guardrail evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailCheck {
    /// Check name, e.g. `max_length` or a configured policy name.
    pub name: String,
    /// Whether the content passed this check.
    pub passed: bool,
    /// What was found, empty when passed.
    pub detail: String,
}

impl GuardrailCheck {
    /// A passing check record.
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: String::new(),
        }
    }

    /// A failing check record with a description of the finding.
    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// The verdict of one guardrail evaluation, with all executed checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailResult {
    /// Strictest outcome across all checks.
    pub status: GuardrailStatus,
    /// Every executed check, in execution order.
    pub checks: Vec<GuardrailCheck>,
}

impl GuardrailResult {
    /// A passing verdict with no recorded checks.
    pub fn pass() -> Self {
        Self {
            status: GuardrailStatus::Pass,
            checks: Vec::new(),
        }
    }

    /// Builds a verdict from check records, taking the status as given.
    pub fn new(status: GuardrailStatus, checks: Vec<GuardrailCheck>) -> Self {
        Self { status, checks }
    }

    /// Whether the orchestrator must redact the gated content.
    pub fn should_block(&self) -> bool {
        self.status == GuardrailStatus::Blocked
    }

    /// Renders this verdict as a history step part.
    pub fn to_step_part(&self) -> StepPart {
        StepPart::Guardrail {
            status: self.status.as_str().to_string(),
            checks: self
                .checks
                .iter()
                .map(|c| serde_json::to_value(c).unwrap_or(serde_json::Value::Null))
                .collect(),
        }
    }
}

/// The fixed message substituted for blocked content.
pub fn redaction_notice(status: GuardrailStatus) -> String {
    format!("[content blocked by guardrail: {status}]")
}
