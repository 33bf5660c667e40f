use crate::guard::Guardrail;
use crate::verdict::{GuardrailCheck, GuardrailResult, GuardrailStatus};
use baton_core::{BatonError, BatonResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What happens when a policy pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    /// Record the match, let the content through.
    Flag,
    /// Redact the content.
    Block,
}

/// One configured content policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Policy name, recorded in check results.
    pub name: String,
    /// Regex evaluated against the content.
    pub pattern: String,
    /// Action taken on a match.
    pub action: PolicyAction,
    /// Agents this policy applies to. Empty means all agents.
    #[serde(default)]
    pub agents: Vec<String>,
}

/// Configuration for a [`RuleGuardrail`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Maximum content length in bytes before the content is blocked.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// Regex policies evaluated after the built-in checks.
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            policies: Vec::new(),
        }
    }
}

fn default_max_content_length() -> usize {
    100_000
}

#[derive(Debug)]
struct CompiledPolicy {
    name: String,
    regex: Regex,
    action: PolicyAction,
    agents: Vec<String>,
}

impl CompiledPolicy {
    fn applies_to(&self, agent_name: &str) -> bool {
        self.agents.is_empty() || self.agents.iter().any(|a| a == agent_name)
    }
}

/// Rule-driven guardrail: length limit, control-character scan, and
/// configured regex policies with per-agent scoping.
#[derive(Debug)]
pub struct RuleGuardrail {
    max_content_length: usize,
    policies: Vec<CompiledPolicy>,
}

impl RuleGuardrail {
    /// Compiles a guardrail from configuration. Invalid regexes are a
    /// configuration error.
    pub fn from_config(config: &GuardrailConfig) -> BatonResult<Self> {
        let mut policies = Vec::with_capacity(config.policies.len());
        for policy in &config.policies {
            let regex = Regex::new(&policy.pattern).map_err(|e| {
                BatonError::Config(format!("Invalid policy pattern '{}': {e}", policy.name))
            })?;
            policies.push(CompiledPolicy {
                name: policy.name.clone(),
                regex,
                action: policy.action,
                agents: policy.agents.clone(),
            });
        }
        Ok(Self {
            max_content_length: config.max_content_length,
            policies,
        })
    }

    /// A guardrail with only the built-in checks.
    pub fn with_defaults() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            policies: Vec::new(),
        }
    }

    fn check_length(&self, content: &str) -> (GuardrailCheck, GuardrailStatus) {
        if content.len() > self.max_content_length {
            (
                GuardrailCheck::failed(
                    "max_length",
                    format!(
                        "content is {} bytes, limit is {}",
                        content.len(),
                        self.max_content_length
                    ),
                ),
                GuardrailStatus::Blocked,
            )
        } else {
            (GuardrailCheck::passed("max_length"), GuardrailStatus::Pass)
        }
    }

    // Control characters other than whitespace are stripped by honest
    // producers, so their presence is flagged; content that is nothing but
    // control characters is blocked outright.
    fn check_control_chars(&self, content: &str) -> (GuardrailCheck, GuardrailStatus) {
        let disallowed = |c: &char| c.is_control() && *c != '\n' && *c != '\t' && *c != '\r';
        let stripped = content.chars().filter(disallowed).count();

        if stripped == 0 {
            return (
                GuardrailCheck::passed("control_chars"),
                GuardrailStatus::Pass,
            );
        }
        if content.chars().all(|c| disallowed(&c)) && !content.is_empty() {
            return (
                GuardrailCheck::failed("control_chars", "content is only control characters"),
                GuardrailStatus::Blocked,
            );
        }
        (
            GuardrailCheck::failed(
                "control_chars",
                format!("{stripped} control characters present"),
            ),
            GuardrailStatus::Flagged,
        )
    }
}

impl Guardrail for RuleGuardrail {
    fn check(&self, content: &str, agent_name: &str) -> GuardrailResult {
        let mut status = GuardrailStatus::Pass;
        let mut checks = Vec::new();

        let (check, severity) = self.check_length(content);
        status = status.max(severity);
        checks.push(check);

        let (check, severity) = self.check_control_chars(content);
        status = status.max(severity);
        checks.push(check);

        for policy in &self.policies {
            if !policy.applies_to(agent_name) {
                continue;
            }
            if policy.regex.is_match(content) {
                debug!(
                    policy = %policy.name,
                    agent = %agent_name,
                    action = ?policy.action,
                    "Guardrail policy matched"
                );
                let severity = match policy.action {
                    PolicyAction::Flag => GuardrailStatus::Flagged,
                    PolicyAction::Block => GuardrailStatus::Blocked,
                };
                status = status.max(severity);
                checks.push(GuardrailCheck::failed(
                    &policy.name,
                    format!("pattern '{}' matched", policy.regex),
                ));
            } else {
                checks.push(GuardrailCheck::passed(&policy.name));
            }
        }

        GuardrailResult::new(status, checks)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn guard_with(policies: Vec<PolicyConfig>) -> RuleGuardrail {
        RuleGuardrail::from_config(&GuardrailConfig {
            max_content_length: 100,
            policies,
        })
        .expect("valid config")
    }

    fn policy(name: &str, pattern: &str, action: PolicyAction) -> PolicyConfig {
        PolicyConfig {
            name: name.to_string(),
            pattern: pattern.to_string(),
            action,
            agents: vec![],
        }
    }

    #[test]
    fn test_clean_content_passes() {
        let guard = guard_with(vec![]);
        let result = guard.check("A perfectly ordinary reply.\nWith a newline.", "writer");
        assert_eq!(result.status, GuardrailStatus::Pass);
        assert!(result.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn test_over_length_blocks() {
        let guard = guard_with(vec![]);
        let long = "x".repeat(200);
        let result = guard.check(&long, "writer");
        assert!(result.should_block());
        let check = result.checks.iter().find(|c| c.name == "max_length").unwrap();
        assert!(!check.passed);
        assert!(check.detail.contains("200 bytes"));
    }

    #[test]
    fn test_embedded_control_chars_flag() {
        let guard = guard_with(vec![]);
        let result = guard.check("Hello\x00World", "writer");
        assert_eq!(result.status, GuardrailStatus::Flagged);
        assert!(!result.should_block());
    }

    #[test]
    fn test_only_control_chars_blocks() {
        let guard = guard_with(vec![]);
        let result = guard.check("\x00\x01\x02", "writer");
        assert!(result.should_block());
    }

    #[test]
    fn test_block_policy_blocks() {
        let guard = guard_with(vec![policy(
            "api_keys",
            r"sk-[A-Za-z0-9]{16,}",
            PolicyAction::Block,
        )]);
        let result = guard.check("here is sk-abcdef0123456789AB for you", "writer");
        assert!(result.should_block());
        let check = result.checks.iter().find(|c| c.name == "api_keys").unwrap();
        assert!(!check.passed);
    }

    #[test]
    fn test_flag_policy_does_not_block() {
        let guard = guard_with(vec![policy("pricing", r"(?i)confidential", PolicyAction::Flag)]);
        let result = guard.check("this is Confidential material", "writer");
        assert_eq!(result.status, GuardrailStatus::Flagged);
        assert!(!result.should_block());
    }

    #[test]
    fn test_agent_scoped_policy() {
        let mut scoped = policy("no_numbers", r"\d", PolicyAction::Block);
        scoped.agents = vec!["accountant".to_string()];
        let guard = guard_with(vec![scoped]);

        assert!(guard.check("the total is 42", "accountant").should_block());
        assert!(!guard.check("the total is 42", "writer").should_block());
        // Out-of-scope policies leave no check record.
        assert!(guard
            .check("the total is 42", "writer")
            .checks
            .iter()
            .all(|c| c.name != "no_numbers"));
    }

    #[test]
    fn test_strictest_status_wins() {
        let guard = guard_with(vec![
            policy("soft", r"maybe", PolicyAction::Flag),
            policy("hard", r"never", PolicyAction::Block),
        ]);
        let result = guard.check("maybe never", "writer");
        assert_eq!(result.status, GuardrailStatus::Blocked);
        assert_eq!(result.checks.len(), 4);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = GuardrailConfig {
            max_content_length: 100,
            policies: vec![policy("broken", r"[unclosed", PolicyAction::Block)],
        };
        let err = RuleGuardrail::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
