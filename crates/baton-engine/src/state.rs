use baton_core::{BatonError, BatonResult, TaskStep, Team};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// How the orchestrator drives a task forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run turns back to back until completion or an explicit pause.
    #[default]
    Autonomous,
    /// Pause before every turn; each turn requires an external resume.
    StepThrough,
    /// Run like autonomous but honor configured breakpoints.
    Debug,
}

impl ExecutionMode {
    /// The snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Autonomous => "autonomous",
            ExecutionMode::StepThrough => "step_through",
            ExecutionMode::Debug => "debug",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named artifact held on the task. Later writes under the same name win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    /// Artifact content.
    pub content: String,
    /// Arbitrary metadata attached by the producer.
    pub metadata: serde_json::Value,
    /// When this entry was (last) written.
    pub created_at: DateTime<Utc>,
}

/// The full mutable state of one task.
///
/// Exactly one driving loop mutates a given `TaskState`; everyone else sees
/// clones via [`TaskState::snapshot`]. The whole struct is the persisted
/// task document — every mutation rewrites it as one JSON file, so the
/// on-disk shape is this struct's camelCase serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    /// Unique task identifier.
    pub task_id: Uuid,
    /// The user prompt the task started from.
    pub initial_prompt: String,
    /// The agent currently holding the conversation. `None` only before the
    /// first assignment.
    pub current_agent: Option<String>,
    /// Completed agent turns. Increments once per turn, including degraded
    /// and redacted ones.
    pub round_count: u32,
    /// Whether the task reached completion.
    pub is_complete: bool,
    /// Whether the task is paused. Completion clears this.
    pub is_paused: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Append-only turn history.
    pub history: Vec<TaskStep>,
    /// Named artifacts, last-write-wins.
    #[serde(default)]
    pub artifacts: HashMap<String, ArtifactEntry>,
    /// How the loop advances.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Active breakpoint tags.
    #[serde(default)]
    pub breakpoints: BTreeSet<String>,
    /// Free-form debugging state, merged on update. Also carries work a
    /// breakpoint pause deferred to the next turn.
    #[serde(default)]
    pub debug_context: HashMap<String, serde_json::Value>,
    /// The most recently matched breakpoint tag.
    #[serde(default)]
    pub last_breakpoint: Option<String>,
}

impl TaskState {
    /// Creates a fresh task at round zero with empty history.
    pub fn new(initial_prompt: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            initial_prompt: initial_prompt.into(),
            current_agent: None,
            round_count: 0,
            is_complete: false,
            is_paused: false,
            created_at: Utc::now(),
            history: Vec::new(),
            artifacts: HashMap::new(),
            execution_mode: mode,
            breakpoints: BTreeSet::new(),
            debug_context: HashMap::new(),
            last_breakpoint: None,
        }
    }

    /// Appends a step to history. History is append-only; nothing ever
    /// removes or rewrites an appended step.
    pub fn add_step(&mut self, step: TaskStep) {
        self.history.push(step);
    }

    /// Assigns the conversation to `name`. The name must be a real team
    /// agent; anything else is a caller bug surfaced as
    /// [`BatonError::UnknownAgent`].
    pub fn set_current_agent(&mut self, name: &str, team: &Team) -> BatonResult<()> {
        if !team.contains_agent(name) {
            return Err(BatonError::UnknownAgent(name.to_string()));
        }
        self.current_agent = Some(name.to_string());
        Ok(())
    }

    /// Counts one completed agent turn.
    pub fn increment_round(&mut self) {
        self.round_count += 1;
    }

    /// Pauses the task. Returns whether the call changed anything, so the
    /// caller can emit `task.paused` at most once. Completed tasks cannot
    /// be paused.
    pub fn pause(&mut self) -> bool {
        if self.is_complete || self.is_paused {
            return false;
        }
        self.is_paused = true;
        true
    }

    /// Clears the paused flag. Returns whether the call changed anything.
    pub fn resume(&mut self) -> bool {
        if !self.is_paused {
            return false;
        }
        self.is_paused = false;
        true
    }

    /// Marks the task complete, clearing any pause. Returns whether the
    /// call changed anything.
    pub fn complete(&mut self) -> bool {
        if self.is_complete {
            return false;
        }
        self.is_complete = true;
        self.is_paused = false;
        true
    }

    /// A deep-cloned copy for inspection. Callers never see live references
    /// into the driving loop's state.
    pub fn snapshot(&self) -> TaskState {
        self.clone()
    }

    /// Merges entries into the debug context. Existing keys are overwritten,
    /// unrelated keys are kept.
    pub fn update_debug_context(&mut self, entries: HashMap<String, serde_json::Value>) {
        self.debug_context.extend(entries);
    }

    /// Stores an artifact under `name`, replacing any previous entry.
    pub fn add_artifact(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.artifacts.insert(
            name.into(),
            ArtifactEntry {
                content: content.into(),
                metadata,
                created_at: Utc::now(),
            },
        );
    }

    /// Replaces the active breakpoint set.
    pub fn set_breakpoints(&mut self, tags: BTreeSet<String>) {
        self.breakpoints = tags;
    }

    /// Switches the execution mode.
    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.execution_mode = mode;
    }

    /// Records the breakpoint tag that most recently matched.
    pub fn record_breakpoint(&mut self, tag: &str) {
        self.last_breakpoint = Some(tag.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use baton_core::AgentConfig;

    fn two_agent_team() -> Team {
        Team::new(
            "newsroom",
            vec![
                AgentConfig {
                    name: "writer".to_string(),
                    system_prompt: "You write.".to_string(),
                    tools: Vec::new(),
                    default_next: None,
                },
                AgentConfig {
                    name: "editor".to_string(),
                    system_prompt: "You edit.".to_string(),
                    tools: Vec::new(),
                    default_next: None,
                },
            ],
            Vec::new(),
            20,
        )
        .unwrap()
    }

    #[test]
    fn test_pause_resume_idempotent() {
        let mut state = TaskState::new("prompt", ExecutionMode::Autonomous);

        assert!(state.pause());
        assert!(!state.pause()); // second call changes nothing
        assert!(state.is_paused);

        assert!(state.resume());
        assert!(!state.resume());
        assert!(!state.is_paused);
    }

    #[test]
    fn test_complete_clears_pause_and_blocks_repause() {
        let mut state = TaskState::new("prompt", ExecutionMode::Autonomous);
        state.pause();

        assert!(state.complete());
        assert!(state.is_complete);
        assert!(!state.is_paused);

        assert!(!state.complete()); // idempotent
        assert!(!state.pause()); // completed tasks cannot pause
    }

    #[test]
    fn test_set_current_agent_rejects_unknown() {
        let team = two_agent_team();
        let mut state = TaskState::new("prompt", ExecutionMode::Autonomous);

        state.set_current_agent("writer", &team).unwrap();
        assert_eq!(state.current_agent.as_deref(), Some("writer"));

        let err = state.set_current_agent("stranger", &team).unwrap_err();
        assert!(matches!(err, BatonError::UnknownAgent(name) if name == "stranger"));
        // The failed call leaves the assignment untouched.
        assert_eq!(state.current_agent.as_deref(), Some("writer"));
    }

    #[test]
    fn test_artifacts_last_write_wins() {
        let mut state = TaskState::new("prompt", ExecutionMode::Autonomous);
        state.add_artifact("draft", "v1", serde_json::Value::Null);
        state.add_artifact("draft", "v2", serde_json::json!({"rev": 2}));

        assert_eq!(state.artifacts.len(), 1);
        assert_eq!(state.artifacts["draft"].content, "v2");
        assert_eq!(state.artifacts["draft"].metadata["rev"], 2);
    }

    #[test]
    fn test_debug_context_merges() {
        let mut state = TaskState::new("prompt", ExecutionMode::Debug);
        state.update_debug_context(HashMap::from([
            ("watch".to_string(), serde_json::json!("round_count")),
            ("note".to_string(), serde_json::json!("first")),
        ]));
        state.update_debug_context(HashMap::from([(
            "note".to_string(),
            serde_json::json!("second"),
        )]));

        assert_eq!(state.debug_context["watch"], "round_count");
        assert_eq!(state.debug_context["note"], "second");
    }

    #[test]
    fn test_persisted_document_uses_camel_case_keys() {
        let mut state = TaskState::new("write a haiku", ExecutionMode::StepThrough);
        state.add_step(TaskStep::user("write a haiku"));
        state.record_breakpoint("handoff");

        let doc = serde_json::to_value(&state).unwrap();
        for key in [
            "taskId",
            "initialPrompt",
            "currentAgent",
            "roundCount",
            "isComplete",
            "isPaused",
            "createdAt",
            "history",
            "artifacts",
            "executionMode",
            "breakpoints",
            "debugContext",
            "lastBreakpoint",
        ] {
            assert!(doc.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(doc["executionMode"], "step_through");
        assert_eq!(doc["lastBreakpoint"], "handoff");
        assert_eq!(doc["history"][0]["agentName"], "user");
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut state = TaskState::new("prompt", ExecutionMode::Autonomous);
        let snap = state.snapshot();
        state.increment_round();

        assert_eq!(snap.round_count, 0);
        assert_eq!(state.round_count, 1);
    }
}
