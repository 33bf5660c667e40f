use crate::breakpoint::{match_breakpoint, Phase};
use crate::prompt::{flatten_history, render_system_prompt};
use crate::router::{decide, RouteAction, RouteContext};
use crate::state::{ExecutionMode, TaskState};
use crate::store::TaskStore;
use crate::streaming::{StepStream, StreamChunk};
use baton_brain::{Brain, BrainError, BrainResponse, StreamEvent};
use baton_core::{
    AgentConfig, BatonError, BatonResult, Event, EventBus, EventKind, StepPart, TaskStep, Team,
    ToolCall, ToolDescriptor, ToolRegistry, ToolResult, TOOL_EXECUTOR_AGENT, USER_AGENT,
};
use baton_guard::{redaction_notice, Guardrail, GuardrailStatus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Debug-context key holding tool calls deferred by a `before_tool_call`
/// pause.
pub const PENDING_TOOL_CALLS: &str = "pending_tool_calls";
/// Debug-context key holding a handoff deferred by a `handoff` pause.
pub const PENDING_HANDOFF: &str = "pending_handoff";

fn degrade_message(err: &BrainError) -> String {
    format!("I'm sorry — I couldn't reach my language model ({err}). Please try again.")
}

/// Drives the agent loop for one team.
///
/// All collaborators are injected at construction; the orchestrator holds no
/// global state and can drive any number of independent tasks. Task state is
/// owned by the caller and passed in mutably, so the registry layer above
/// decides locking and lifetime.
///
/// Failure model: storage I/O is the only error that aborts a turn. Brain
/// failures degrade into an apology turn, tool failures become in-band error
/// results, and malformed handoff directives are ignored by the router.
pub struct Orchestrator {
    team: Arc<Team>,
    brain: Arc<dyn Brain>,
    tools: Arc<ToolRegistry>,
    guard: Arc<dyn Guardrail>,
    store: Arc<dyn TaskStore>,
    bus: Arc<EventBus>,
}

impl Orchestrator {
    /// Wires an orchestrator from its injected collaborators.
    pub fn new(
        team: Arc<Team>,
        brain: Arc<dyn Brain>,
        tools: Arc<ToolRegistry>,
        guard: Arc<dyn Guardrail>,
        store: Arc<dyn TaskStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            team,
            brain,
            tools,
            guard,
            store,
            bus,
        }
    }

    /// The team this orchestrator drives.
    pub fn team(&self) -> &Arc<Team> {
        &self.team
    }

    /// The task store backing persistence.
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// The lifecycle event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Creates a new task.
    ///
    /// The input prompt is gated first: a blocked verdict fails with
    /// [`BatonError::GuardrailBlocked`] and no task is created. The initial
    /// agent defaults to the first agent in team declaration order.
    pub async fn start(
        &self,
        prompt: &str,
        initial_agent: Option<&str>,
        mode: ExecutionMode,
    ) -> BatonResult<TaskState> {
        let verdict = self.guard.check(prompt, USER_AGENT);
        if verdict.should_block() {
            let finding = verdict
                .checks
                .iter()
                .find(|c| !c.passed)
                .map(|c| c.detail.clone())
                .unwrap_or_else(|| "input rejected".to_string());
            warn!(detail = %finding, "Input prompt blocked by guardrail");
            return Err(BatonError::GuardrailBlocked(finding));
        }

        let first = match initial_agent {
            Some(name) => name.to_string(),
            None => self
                .team
                .first_agent()
                .map(|a| a.name.clone())
                .ok_or_else(|| BatonError::Config("Team has no agents".to_string()))?,
        };

        let mut state = TaskState::new(prompt, mode);
        state.set_current_agent(&first, &self.team)?;
        state.add_step(TaskStep::user(prompt));
        self.store.save(&state).await?;

        info!(
            task_id = %state.task_id,
            agent = %first,
            mode = %mode,
            "Task started"
        );
        self.emit(
            &state,
            EventKind::TaskStarted,
            json!({ "initialAgent": first, "mode": mode.as_str() }),
        )
        .await;

        Ok(state)
    }

    /// Drives the task until it completes or pauses.
    ///
    /// `pause_signal` is checked at turn boundaries, never mid-turn; an
    /// in-flight brain call always finishes its turn first.
    pub async fn run(
        &self,
        state: &mut TaskState,
        stream: Option<&mpsc::Sender<StreamChunk>>,
        pause_signal: &AtomicBool,
    ) -> BatonResult<()> {
        while !state.is_complete && !state.is_paused {
            if pause_signal.swap(false, Ordering::SeqCst) {
                if state.pause() {
                    self.store.save(state).await?;
                    self.emit(
                        state,
                        EventKind::TaskPaused,
                        json!({ "reason": "pause requested" }),
                    )
                    .await;
                }
                break;
            }
            self.step(state, stream).await?;
        }
        Ok(())
    }

    /// Executes one agent turn, honoring step-through parking.
    pub async fn step(
        &self,
        state: &mut TaskState,
        stream: Option<&mpsc::Sender<StreamChunk>>,
    ) -> BatonResult<()> {
        self.step_inner(state, stream, true).await
    }

    /// Executes one agent turn granted by an external `resume`, bypassing
    /// the step-through park so the turn actually runs.
    pub async fn step_granted(
        &self,
        state: &mut TaskState,
        stream: Option<&mpsc::Sender<StreamChunk>>,
    ) -> BatonResult<()> {
        self.step_inner(state, stream, false).await
    }

    async fn step_inner(
        &self,
        state: &mut TaskState,
        stream: Option<&mpsc::Sender<StreamChunk>>,
        honor_step_mode: bool,
    ) -> BatonResult<()> {
        if state.is_complete || state.is_paused {
            return Ok(());
        }

        // Work deferred by a debugger pause finishes before the next turn.
        self.drain_deferred(state).await?;
        if state.is_complete || state.is_paused {
            return Ok(());
        }

        if self.check_breakpoint(state, Phase::BeforeAgentTurn).await? {
            return Ok(());
        }

        if honor_step_mode && state.execution_mode == ExecutionMode::StepThrough {
            if state.pause() {
                self.store.save(state).await?;
                self.emit(
                    state,
                    EventKind::TaskPaused,
                    json!({ "reason": "step mode" }),
                )
                .await;
            }
            return Ok(());
        }

        let agent_name = state
            .current_agent
            .clone()
            .ok_or_else(|| BatonError::Config("Task has no current agent".to_string()))?;
        let agent = self
            .team
            .agent(&agent_name)
            .ok_or_else(|| BatonError::UnknownAgent(agent_name.clone()))?;
        let tools = self.tools.descriptors_for(&agent.tools);

        self.emit(
            state,
            EventKind::AgentStart,
            json!({ "agent": agent.name, "round": state.round_count }),
        )
        .await;

        let step_id = Uuid::new_v4();
        let response = self
            .generate_response(state, agent, step_id, &tools, stream)
            .await?;

        // Gate the assembled response text; blocked turns are persisted
        // redacted but still count as turns.
        let verdict = self.guard.check(&response.content, &agent.name);
        let blocked = verdict.should_block();
        let gated_text = if blocked {
            warn!(agent = %agent.name, "Response text blocked by guardrail");
            redaction_notice(verdict.status)
        } else {
            response.content.clone()
        };

        let mut parts: Vec<StepPart> = Vec::new();
        if !gated_text.is_empty() || response.tool_calls.is_empty() {
            parts.push(StepPart::Text {
                text: gated_text.clone(),
            });
        }
        for call in &response.tool_calls {
            parts.push(StepPart::ToolCall {
                id: call.id.clone(),
                tool_name: call.name.clone(),
                args: call.arguments.clone(),
            });
        }
        if verdict.status != GuardrailStatus::Pass {
            parts.push(verdict.to_step_part());
        }

        let agent_step = TaskStep::from_parts_with_id(step_id, &agent.name, parts)
            .ok_or_else(|| BatonError::Config("Agent turn produced no content".to_string()))?;

        let rounds_before = state.round_count;
        state.add_step(agent_step);
        state.increment_round();
        self.store.save(state).await?;

        if response.has_tool_calls() {
            if let Some(tag) = match_breakpoint(&state.breakpoints, Phase::BeforeToolCall) {
                let pending = serde_json::to_value(&response.tool_calls)?;
                state.update_debug_context(HashMap::from([(
                    PENDING_TOOL_CALLS.to_string(),
                    pending,
                )]));
                self.breakpoint_hit(state, Phase::BeforeToolCall, &tag).await?;
                return Ok(());
            }
            self.execute_tool_calls(state, &response.tool_calls).await?;
            if state.is_paused {
                return Ok(());
            }
        }

        let decision = decide(
            &self.team,
            &agent.name,
            &gated_text,
            RouteContext {
                rounds_completed: rounds_before,
            },
        );

        match decision.action {
            RouteAction::Complete => {
                state.complete();
                self.store.save(state).await?;
                info!(
                    task_id = %state.task_id,
                    rounds = state.round_count,
                    reason = %decision.reason,
                    "Task complete"
                );
                self.emit(
                    state,
                    EventKind::AgentComplete,
                    json!({ "agent": agent.name, "round": state.round_count }),
                )
                .await;
                self.emit(
                    state,
                    EventKind::TaskCompleted,
                    json!({ "reason": decision.reason, "rounds": state.round_count }),
                )
                .await;
            }
            RouteAction::Handoff => {
                let target = decision.next_agent.ok_or_else(|| {
                    BatonError::Config("Handoff decision without target".to_string())
                })?;
                if let Some(tag) = match_breakpoint(&state.breakpoints, Phase::Handoff) {
                    state.update_debug_context(HashMap::from([(
                        PENDING_HANDOFF.to_string(),
                        json!({ "to": target, "reason": decision.reason }),
                    )]));
                    self.breakpoint_hit(state, Phase::Handoff, &tag).await?;
                    self.emit(
                        state,
                        EventKind::AgentComplete,
                        json!({ "agent": agent.name, "round": state.round_count }),
                    )
                    .await;
                } else {
                    state.set_current_agent(&target, &self.team)?;
                    self.store.save(state).await?;
                    info!(from = %agent.name, to = %target, reason = %decision.reason, "Handoff");
                    self.emit(
                        state,
                        EventKind::AgentHandoff,
                        json!({ "from": agent.name, "to": target, "reason": decision.reason }),
                    )
                    .await;
                    self.check_breakpoint(state, Phase::AfterAgentTurn).await?;
                    self.emit(
                        state,
                        EventKind::AgentComplete,
                        json!({ "agent": agent.name, "round": state.round_count }),
                    )
                    .await;
                }
            }
            RouteAction::Continue => {
                self.check_breakpoint(state, Phase::AfterAgentTurn).await?;
                self.emit(
                    state,
                    EventKind::AgentComplete,
                    json!({ "agent": agent.name, "round": state.round_count }),
                )
                .await;
            }
        }

        Ok(())
    }

    /// Produces the turn's response, streaming chunks when a consumer is
    /// attached. A brain failure never propagates: the turn degrades into
    /// the fixed apology text after an `error` event and breakpoint check.
    async fn generate_response(
        &self,
        state: &mut TaskState,
        agent: &AgentConfig,
        step_id: Uuid,
        tools: &[ToolDescriptor],
        stream: Option<&mpsc::Sender<StreamChunk>>,
    ) -> BatonResult<BrainResponse> {
        let system_prompt = render_system_prompt(&self.team, agent, tools, state);
        let messages = flatten_history(&state.history, &agent.name);

        let outcome = match stream {
            Some(tx) => {
                let mut sink = StepStream::new(tx.clone(), step_id, agent.name.clone());
                match self
                    .brain
                    .chat_stream(Some(&system_prompt), &messages, tools)
                    .await
                {
                    Ok((mut rx, handle)) => {
                        while let Some(event) = rx.recv().await {
                            match event {
                                StreamEvent::TextDelta { text } => sink.text(&text).await,
                                StreamEvent::Done => break,
                                StreamEvent::Error { message } => {
                                    warn!(agent = %agent.name, %message, "Stream reported error")
                                }
                                // Tool calls surface in the aggregated response.
                                _ => {}
                            }
                        }
                        let result = match handle.await {
                            Ok(result) => result,
                            Err(e) => Err(BrainError::Http(format!("stream worker failed: {e}"))),
                        };
                        match &result {
                            Ok(_) => sink.complete().await,
                            Err(e) => sink.fail(&e.to_string()).await,
                        }
                        result
                    }
                    Err(e) => {
                        sink.fail(&e.to_string()).await;
                        Err(e)
                    }
                }
            }
            None => self.brain.chat(Some(&system_prompt), &messages, tools).await,
        };

        match outcome {
            Ok(response) => Ok(response),
            Err(e) => {
                error!(agent = %agent.name, error = %e, "Brain call failed, degrading turn");
                self.emit(
                    state,
                    EventKind::Error,
                    json!({ "scope": "brain", "agent": agent.name, "detail": e.to_string() }),
                )
                .await;
                if let Some(tag) = match_breakpoint(&state.breakpoints, Phase::Error) {
                    // The turn still completes; the loop parks afterwards.
                    self.breakpoint_hit(state, Phase::Error, &tag).await?;
                }
                Ok(BrainResponse::text(degrade_message(&e)))
            }
        }
    }

    /// Executes tool calls and appends one `tool_executor` step with their
    /// results. Executor failures become in-band error results.
    async fn execute_tool_calls(
        &self,
        state: &mut TaskState,
        calls: &[ToolCall],
    ) -> BatonResult<()> {
        let mut parts = Vec::with_capacity(calls.len());
        for call in calls {
            info!(tool = %call.name, call_id = %call.id, "Executing tool call");
            let result = match self.tools.execute(call).await {
                Ok(result) => result,
                Err(e) => {
                    error!(tool = %call.name, error = %e, "Tool executor failed");
                    self.emit(
                        state,
                        EventKind::Error,
                        json!({ "scope": "tool", "tool": call.name, "detail": e.to_string() }),
                    )
                    .await;
                    ToolResult::error(&call.id, e.to_string())
                }
            };
            if result.is_error {
                warn!(tool = %call.name, detail = %result.content, "Tool returned error result");
            }
            parts.push(StepPart::ToolResult {
                call_id: result.call_id,
                result: result.content,
                is_error: result.is_error,
            });
        }

        if let Some(step) = TaskStep::from_parts(TOOL_EXECUTOR_AGENT, parts) {
            state.add_step(step);
            self.store.save(state).await?;
        }

        self.check_breakpoint(state, Phase::AfterToolCall).await?;
        Ok(())
    }

    /// Finishes work a debugger pause deferred: pending tool calls first,
    /// then a pending handoff.
    async fn drain_deferred(&self, state: &mut TaskState) -> BatonResult<()> {
        if let Some(value) = state.debug_context.remove(PENDING_TOOL_CALLS) {
            match serde_json::from_value::<Vec<ToolCall>>(value) {
                Ok(calls) if !calls.is_empty() => {
                    info!(
                        task_id = %state.task_id,
                        count = calls.len(),
                        "Resuming deferred tool calls"
                    );
                    self.execute_tool_calls(state, &calls).await?;
                    if state.is_paused {
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        task_id = %state.task_id,
                        error = %e,
                        "Discarding unreadable deferred tool calls"
                    );
                }
            }
        }

        if let Some(value) = state.debug_context.remove(PENDING_HANDOFF) {
            let target = value
                .get("to")
                .and_then(|v| v.as_str())
                .or_else(|| value.as_str())
                .map(str::to_string);
            if let Some(target) = target {
                let from = state.current_agent.clone().unwrap_or_default();
                state.set_current_agent(&target, &self.team)?;
                self.store.save(state).await?;
                info!(from = %from, to = %target, "Applying deferred handoff");
                self.emit(
                    state,
                    EventKind::AgentHandoff,
                    json!({ "from": from, "to": target, "reason": "deferred handoff applied on resume" }),
                )
                .await;
            }
        }

        Ok(())
    }

    async fn check_breakpoint(&self, state: &mut TaskState, phase: Phase) -> BatonResult<bool> {
        match match_breakpoint(&state.breakpoints, phase) {
            Some(tag) => {
                self.breakpoint_hit(state, phase, &tag).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn breakpoint_hit(
        &self,
        state: &mut TaskState,
        phase: Phase,
        tag: &str,
    ) -> BatonResult<()> {
        warn!(task_id = %state.task_id, phase = %phase, tag, "Breakpoint hit");
        state.record_breakpoint(tag);
        let paused_now = state.pause();
        self.store.save(state).await?;
        self.emit(
            state,
            EventKind::BreakpointHit,
            json!({ "phase": phase.as_str(), "tag": tag }),
        )
        .await;
        if paused_now {
            self.emit(
                state,
                EventKind::TaskPaused,
                json!({ "reason": format!("breakpoint {tag}") }),
            )
            .await;
        }
        Ok(())
    }

    async fn emit(&self, state: &TaskState, kind: EventKind, data: serde_json::Value) {
        self.bus
            .publish(Event::new(kind, "orchestrator", state.task_id, data))
            .await;
    }
}
