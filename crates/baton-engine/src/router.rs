use baton_core::{Team, USER_AGENT};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// A handoff instruction detected in response text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// No handoff instruction present.
    None,
    /// The response asks to hand the conversation to `target`.
    Handoff {
        /// Canonical name of the destination agent (or `"user"`).
        target: String,
    },
}

/// What the orchestrator should do after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    /// Same agent keeps the conversation.
    Continue,
    /// Control moves to `RouteDecision::next_agent`.
    Handoff,
    /// The task is finished.
    Complete,
}

/// The routing verdict for one completed turn.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// What to do.
    pub action: RouteAction,
    /// Destination agent for [`RouteAction::Handoff`].
    pub next_agent: Option<String>,
    /// Human-readable explanation, also used in logs and events.
    pub reason: String,
}

/// Loop-position facts the router needs but the response text cannot carry.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext {
    /// Agent turns completed before the turn being routed.
    pub rounds_completed: u32,
}

enum PatternKind {
    /// `HANDOFF_REQUEST: {"destination_agent": "<name>"}`
    Marker,
    /// Free-text pattern capturing the destination name in group 1.
    Named,
}

/// The ordered directive pattern list. Priority is fixed: the structured
/// marker outranks "hand off to", which outranks "transfer to". Compiled
/// once; the patterns are static so compilation cannot fail at runtime.
fn directive_patterns() -> &'static Vec<(PatternKind, Regex)> {
    static PATTERNS: OnceLock<Vec<(PatternKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (PatternKind::Marker, r"HANDOFF_REQUEST:\s*(\{[^}]*\})"),
            (
                PatternKind::Named,
                r"(?i)\bhand(?:ing)?\s+(?:this\s+)?off\s+to\s+([A-Za-z0-9_-]+)",
            ),
            (
                PatternKind::Named,
                r"(?i)\btransfer(?:ring)?\s+to\s+([A-Za-z0-9_-]+)",
            ),
        ]
        .into_iter()
        .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
        .collect()
    })
}

/// Maps a captured name to a canonical team agent name (or `"user"`).
///
/// Exact match first; otherwise a case-insensitive match, since models tend
/// to title-case names in prose. An unresolvable name yields `None`.
fn resolve_agent(team: &Team, raw: &str) -> Option<String> {
    if raw == USER_AGENT || team.contains_agent(raw) {
        return Some(raw.to_string());
    }
    let lower = raw.to_lowercase();
    if lower == USER_AGENT {
        return Some(USER_AGENT.to_string());
    }
    team.agents
        .iter()
        .find(|a| a.name.to_lowercase() == lower)
        .map(|a| a.name.clone())
}

/// Scans response text for a handoff directive.
///
/// Patterns are tried in priority order; within one pattern, matches are
/// tried in text order. The first match that resolves to a known destination
/// wins. A match naming an unknown agent counts as no match, never as an
/// error, and scanning continues.
pub fn detect_directive(team: &Team, text: &str) -> Directive {
    for (kind, re) in directive_patterns() {
        for caps in re.captures_iter(text) {
            let raw = match kind {
                PatternKind::Marker => {
                    let Some(body) = caps.get(1) else { continue };
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(body.as_str())
                    else {
                        continue;
                    };
                    match value["destination_agent"].as_str() {
                        Some(name) => name.to_string(),
                        None => continue,
                    }
                }
                PatternKind::Named => match caps.get(1) {
                    Some(m) => m.as_str().to_string(),
                    None => continue,
                },
            };
            if let Some(target) = resolve_agent(team, &raw) {
                return Directive::Handoff { target };
            }
        }
    }
    Directive::None
}

fn condition_holds(condition: &str, response_text: &str) -> bool {
    response_text
        .to_lowercase()
        .contains(&condition.to_lowercase())
}

/// Routes one completed turn.
///
/// Evaluation order: round limit, directive scan, rule validation, then the
/// no-directive defaults. The round limit is checked before any text scan so
/// the cap holds regardless of response content.
pub fn decide(
    team: &Team,
    current_agent: &str,
    response_text: &str,
    ctx: RouteContext,
) -> RouteDecision {
    // The turn being routed is about to complete; the limit counts it.
    if ctx.rounds_completed + 1 >= team.max_rounds {
        return RouteDecision {
            action: RouteAction::Complete,
            next_agent: None,
            reason: format!("round limit of {} reached", team.max_rounds),
        };
    }

    match detect_directive(team, response_text) {
        Directive::Handoff { target } => match team.rule_for(current_agent, &target) {
            Some(rule) => {
                if let Some(condition) = &rule.condition {
                    if !condition_holds(condition, response_text) {
                        warn!(
                            from = current_agent,
                            to = %target,
                            condition = %condition,
                            "Handoff rejected: rule condition not met"
                        );
                        return RouteDecision {
                            action: RouteAction::Continue,
                            next_agent: None,
                            reason: format!(
                                "handoff to '{target}' rejected: condition '{condition}' not met"
                            ),
                        };
                    }
                }
                if target == USER_AGENT {
                    return RouteDecision {
                        action: RouteAction::Complete,
                        next_agent: None,
                        reason: "handed back to the user".to_string(),
                    };
                }
                RouteDecision {
                    action: RouteAction::Handoff,
                    next_agent: Some(target),
                    reason: "handoff directive".to_string(),
                }
            }
            None => {
                warn!(
                    from = current_agent,
                    to = %target,
                    "Handoff rejected: no rule allows this transition"
                );
                RouteDecision {
                    action: RouteAction::Continue,
                    next_agent: None,
                    reason: format!(
                        "handoff to '{target}' rejected: no rule from '{current_agent}'"
                    ),
                }
            }
        },
        Directive::None => {
            if team.productive_agent_count() <= 1 {
                return RouteDecision {
                    action: RouteAction::Complete,
                    next_agent: None,
                    reason: "single productive agent".to_string(),
                };
            }
            if let Some(next) = team.agent(current_agent).and_then(|a| a.default_next.clone()) {
                return RouteDecision {
                    action: RouteAction::Handoff,
                    next_agent: Some(next),
                    reason: "default next agent".to_string(),
                };
            }
            RouteDecision {
                action: RouteAction::Continue,
                next_agent: None,
                reason: "no handoff directive".to_string(),
            }
        }
    }
}
