use crate::error::{BatonError, BatonResult};
use crate::step::USER_AGENT;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Static configuration for one agent in a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name, used in handoff directives and step attribution.
    pub name: String,
    /// System prompt prepended to every model call for this agent.
    #[serde(default)]
    pub system_prompt: String,
    /// Names of tools this agent may call.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Agent to hand off to when a turn produces no explicit directive.
    #[serde(default)]
    pub default_next: Option<String>,
}

/// An allowed transition between agents.
///
/// A handoff directive is honored only if a rule with matching endpoints
/// exists. `condition`, when present, must also hold for the response text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRule {
    /// Agent the transition starts from.
    pub from_agent: String,
    /// Agent the transition goes to. The pseudo-agent `"user"` is allowed.
    pub to_agent: String,
    /// Case-insensitive substring the response text must contain.
    #[serde(default)]
    pub condition: Option<String>,
}

/// Immutable team topology: agents, allowed handoffs and the round limit.
///
/// Built from TOML and validated once at load. After that the team is shared
/// read-only across all tasks; nothing in the core mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    /// Team name, used in logs.
    #[serde(default = "default_team_name")]
    pub name: String,
    /// Agents in declaration order. The first agent is the default starter.
    pub agents: Vec<AgentConfig>,
    /// Allowed transitions between agents.
    #[serde(default)]
    pub handoff_rules: Vec<HandoffRule>,
    /// Hard cap on completed agent turns per task.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_team_name() -> String {
    "team".to_string()
}

fn default_max_rounds() -> u32 {
    20
}

impl Team {
    /// Builds and validates a team.
    pub fn new(
        name: impl Into<String>,
        agents: Vec<AgentConfig>,
        handoff_rules: Vec<HandoffRule>,
        max_rounds: u32,
    ) -> BatonResult<Self> {
        let team = Self {
            name: name.into(),
            agents,
            handoff_rules,
            max_rounds,
        };
        team.validate()?;
        Ok(team)
    }

    /// Parses and validates a team from TOML text.
    pub fn from_toml_str(content: &str) -> BatonResult<Self> {
        let team: Team = toml::from_str(content)
            .map_err(|e| BatonError::Config(format!("Invalid team config: {e}")))?;
        team.validate()?;
        Ok(team)
    }

    /// Reads and validates a team from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> BatonResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            BatonError::Config(format!(
                "Failed to read team config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> BatonResult<()> {
        if self.agents.is_empty() {
            return Err(BatonError::Config("Team has no agents".to_string()));
        }
        if self.max_rounds == 0 {
            return Err(BatonError::Config(
                "max_rounds must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name == USER_AGENT {
                return Err(BatonError::Config(format!(
                    "Agent name '{USER_AGENT}' is reserved"
                )));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(BatonError::Config(format!(
                    "Duplicate agent name: {}",
                    agent.name
                )));
            }
        }

        for agent in &self.agents {
            if let Some(next) = &agent.default_next {
                if !seen.contains(next.as_str()) {
                    return Err(BatonError::Config(format!(
                        "Agent '{}' has unknown default_next '{next}'",
                        agent.name
                    )));
                }
            }
        }

        for rule in &self.handoff_rules {
            if !seen.contains(rule.from_agent.as_str()) {
                return Err(BatonError::Config(format!(
                    "Handoff rule references unknown from_agent '{}'",
                    rule.from_agent
                )));
            }
            // Handing back to the user is always an allowed destination.
            if rule.to_agent != USER_AGENT && !seen.contains(rule.to_agent.as_str()) {
                return Err(BatonError::Config(format!(
                    "Handoff rule references unknown to_agent '{}'",
                    rule.to_agent
                )));
            }
        }

        Ok(())
    }

    /// Looks up an agent by name.
    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// The agent that starts a task when no initial agent is specified.
    pub fn first_agent(&self) -> Option<&AgentConfig> {
        self.agents.first()
    }

    /// Whether an agent with this name exists in the team.
    pub fn contains_agent(&self, name: &str) -> bool {
        self.agents.iter().any(|a| a.name == name)
    }

    /// Number of agents that can take turns. The `"user"` pseudo-agent is
    /// never productive.
    pub fn productive_agent_count(&self) -> usize {
        self.agents.iter().filter(|a| a.name != USER_AGENT).count()
    }

    /// Destinations reachable from an agent through declared rules.
    pub fn handoff_targets(&self, from: &str) -> Vec<&str> {
        self.handoff_rules
            .iter()
            .filter(|r| r.from_agent == from)
            .map(|r| r.to_agent.as_str())
            .collect()
    }

    /// The first rule allowing `from` to hand off to `to`, if any.
    pub fn rule_for(&self, from: &str, to: &str) -> Option<&HandoffRule> {
        self.handoff_rules
            .iter()
            .find(|r| r.from_agent == from && r.to_agent == to)
    }
}
