use std::collections::BTreeSet;

/// Execution phases a breakpoint can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before an agent turn starts.
    BeforeAgentTurn,
    /// After an agent turn's step was appended.
    AfterAgentTurn,
    /// A handoff is about to be applied.
    Handoff,
    /// Tool calls are about to be executed.
    BeforeToolCall,
    /// Tool results were appended.
    AfterToolCall,
    /// A recoverable error occurred during the turn.
    Error,
}

impl Phase {
    /// The phase's tag as it appears in breakpoint sets.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BeforeAgentTurn => "before_agent_turn",
            Phase::AfterAgentTurn => "after_agent_turn",
            Phase::Handoff => "handoff",
            Phase::BeforeToolCall => "before_tool_call",
            Phase::AfterToolCall => "after_tool_call",
            Phase::Error => "error",
        }
    }

    fn is_agent_turn(self) -> bool {
        matches!(self, Phase::BeforeAgentTurn | Phase::AfterAgentTurn)
    }

    fn is_tool_call(self) -> bool {
        matches!(self, Phase::BeforeToolCall | Phase::AfterToolCall)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a breakpoint fires at `phase`, returning the tag that
/// matched (which becomes `last_breakpoint`).
///
/// Precedence: the literal `"all"`, then an exact phase tag, then the coarse
/// `"agent_turn"` and `"tool_call"` group tags. Any other tag only ever
/// matches its exact phase name, so an unknown tag simply never fires.
pub fn match_breakpoint(breakpoints: &BTreeSet<String>, phase: Phase) -> Option<String> {
    if breakpoints.contains("all") {
        return Some("all".to_string());
    }
    if breakpoints.contains(phase.as_str()) {
        return Some(phase.as_str().to_string());
    }
    if phase.is_agent_turn() && breakpoints.contains("agent_turn") {
        return Some("agent_turn".to_string());
    }
    if phase.is_tool_call() && breakpoints.contains("tool_call") {
        return Some("tool_call".to_string());
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_all_matches_every_phase() {
        let bps = tags(&["all"]);
        for phase in [
            Phase::BeforeAgentTurn,
            Phase::AfterAgentTurn,
            Phase::Handoff,
            Phase::BeforeToolCall,
            Phase::AfterToolCall,
            Phase::Error,
        ] {
            assert_eq!(match_breakpoint(&bps, phase).as_deref(), Some("all"));
        }
    }

    #[test]
    fn test_exact_tag_matches_only_its_phase() {
        let bps = tags(&["handoff"]);
        assert_eq!(
            match_breakpoint(&bps, Phase::Handoff).as_deref(),
            Some("handoff")
        );
        assert_eq!(match_breakpoint(&bps, Phase::BeforeAgentTurn), None);
        assert_eq!(match_breakpoint(&bps, Phase::Error), None);
    }

    #[test]
    fn test_coarse_agent_turn_tag() {
        let bps = tags(&["agent_turn"]);
        assert_eq!(
            match_breakpoint(&bps, Phase::BeforeAgentTurn).as_deref(),
            Some("agent_turn")
        );
        assert_eq!(
            match_breakpoint(&bps, Phase::AfterAgentTurn).as_deref(),
            Some("agent_turn")
        );
        assert_eq!(match_breakpoint(&bps, Phase::Handoff), None);
        assert_eq!(match_breakpoint(&bps, Phase::BeforeToolCall), None);
    }

    #[test]
    fn test_coarse_tool_call_tag() {
        let bps = tags(&["tool_call"]);
        assert_eq!(
            match_breakpoint(&bps, Phase::BeforeToolCall).as_deref(),
            Some("tool_call")
        );
        assert_eq!(
            match_breakpoint(&bps, Phase::AfterToolCall).as_deref(),
            Some("tool_call")
        );
        assert_eq!(match_breakpoint(&bps, Phase::AfterAgentTurn), None);
    }

    #[test]
    fn test_precedence_all_then_exact_then_coarse() {
        let bps = tags(&["all", "handoff", "agent_turn"]);
        assert_eq!(
            match_breakpoint(&bps, Phase::Handoff).as_deref(),
            Some("all")
        );

        let bps = tags(&["before_agent_turn", "agent_turn"]);
        assert_eq!(
            match_breakpoint(&bps, Phase::BeforeAgentTurn).as_deref(),
            Some("before_agent_turn")
        );
        // The coarse tag still covers the phase its exact sibling does not name.
        assert_eq!(
            match_breakpoint(&bps, Phase::AfterAgentTurn).as_deref(),
            Some("agent_turn")
        );
    }

    #[test]
    fn test_unknown_tag_never_fires() {
        let bps = tags(&["somewhere_else"]);
        for phase in [Phase::BeforeAgentTurn, Phase::Handoff, Phase::Error] {
            assert_eq!(match_breakpoint(&bps, phase), None);
        }
    }

    #[test]
    fn test_empty_set_never_fires() {
        let bps = BTreeSet::new();
        assert_eq!(match_breakpoint(&bps, Phase::Handoff), None);
    }
}
