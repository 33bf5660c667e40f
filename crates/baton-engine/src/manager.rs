use crate::orchestrator::Orchestrator;
use crate::state::{ExecutionMode, TaskState};
use crate::streaming::{StreamChunk, STREAM_CHANNEL_CAPACITY};
use baton_core::{BatonError, BatonResult, Event, EventKind, TaskStep};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info};
use uuid::Uuid;

/// Default idle lifetime of a cached task registry entry.
pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(3600);

/// One live task: its state under a driving lock, plus the cooperative
/// pause signal observed by the loop at turn boundaries.
#[derive(Clone)]
struct TaskHandle {
    state: Arc<Mutex<TaskState>>,
    pause_signal: Arc<AtomicBool>,
    last_access: Arc<parking_lot::Mutex<Instant>>,
}

impl TaskHandle {
    fn new(state: TaskState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            pause_signal: Arc::new(AtomicBool::new(false)),
            last_access: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }
}

/// The public face of the engine: task lifecycle operations over an
/// in-memory registry backed by the task store.
///
/// The registry is a TTL cache, not the source of truth. Idle entries are
/// swept on access; an evicted task is reloaded from the store
/// transparently, so callers never observe eviction. Every operation on an
/// id that is neither cached nor persisted fails with
/// [`BatonError::TaskNotFound`].
pub struct TaskManager {
    orchestrator: Arc<Orchestrator>,
    registry: RwLock<HashMap<Uuid, TaskHandle>>,
    ttl: Duration,
}

impl TaskManager {
    /// Creates a manager with the default cache TTL.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self::with_ttl(orchestrator, DEFAULT_TASK_TTL)
    }

    /// Creates a manager evicting entries idle longer than `ttl`.
    pub fn with_ttl(orchestrator: Arc<Orchestrator>, ttl: Duration) -> Self {
        Self {
            orchestrator,
            registry: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Creates a task and returns its id. The task does not run yet.
    pub async fn start_task(
        &self,
        prompt: &str,
        initial_agent: Option<&str>,
        mode: ExecutionMode,
    ) -> BatonResult<Uuid> {
        let state = self.orchestrator.start(prompt, initial_agent, mode).await?;
        let id = state.task_id;
        self.registry.write().await.insert(id, TaskHandle::new(state));
        Ok(id)
    }

    /// Drives the task until it completes or pauses, then returns a snapshot.
    pub async fn execute_task(&self, id: Uuid) -> BatonResult<TaskState> {
        let handle = self.handle(id).await?;
        let mut state = handle.state.lock().await;
        self.orchestrator
            .run(&mut state, None, &handle.pause_signal)
            .await?;
        Ok(state.snapshot())
    }

    /// Drives the task on a background tokio task, streaming content chunks
    /// to the returned receiver.
    ///
    /// This is the token channel of the dual-channel design; lifecycle
    /// events arrive separately through
    /// [`EventBus::subscribe_channel`](baton_core::EventBus::subscribe_channel).
    /// Dropping the receiver stops chunk emission without disturbing the
    /// running task.
    pub async fn execute_task_streaming(
        &self,
        id: Uuid,
    ) -> BatonResult<mpsc::Receiver<StreamChunk>> {
        let handle = self.handle(id).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let orchestrator = Arc::clone(&self.orchestrator);

        tokio::spawn(async move {
            let mut state = handle.state.lock().await;
            if let Err(e) = orchestrator
                .run(&mut state, Some(&tx), &handle.pause_signal)
                .await
            {
                error!(task_id = %id, error = %e, "Streaming execution failed");
                let event = Event::new(
                    EventKind::Error,
                    "task_manager",
                    id,
                    json!({ "scope": "execution", "detail": e.to_string() }),
                );
                orchestrator.bus().publish(event).await;
            }
        });

        Ok(rx)
    }

    /// Requests a pause.
    ///
    /// When no driver is active the pause applies immediately; otherwise the
    /// signal is picked up at the next turn boundary, never mid-turn. Pausing
    /// an already paused or completed task changes nothing and emits nothing.
    pub async fn pause_task(&self, id: Uuid) -> BatonResult<()> {
        let handle = self.handle(id).await?;
        handle.pause_signal.store(true, Ordering::SeqCst);

        match handle.state.try_lock() {
            Ok(mut state) => {
                handle.pause_signal.store(false, Ordering::SeqCst);
                if state.pause() {
                    self.orchestrator.store().save(&state).await?;
                    self.publish(id, EventKind::TaskPaused, json!({ "reason": "pause requested" }))
                        .await;
                    info!(task_id = %id, "Task paused");
                }
            }
            Err(_) => {
                info!(task_id = %id, "Pause requested, loop will park at the next turn boundary");
            }
        }
        Ok(())
    }

    /// Resumes a paused task: one granted turn runs even in step-through
    /// mode, then the normal loop continues until completion or the next
    /// pause point.
    pub async fn resume_task(&self, id: Uuid) -> BatonResult<TaskState> {
        let handle = self.handle(id).await?;
        handle.pause_signal.store(false, Ordering::SeqCst);
        let mut state = handle.state.lock().await;

        if state.is_complete {
            return Ok(state.snapshot());
        }
        if state.resume() {
            self.orchestrator.store().save(&state).await?;
            self.publish(
                id,
                EventKind::TaskResumed,
                json!({ "mode": state.execution_mode.as_str() }),
            )
            .await;
            info!(task_id = %id, "Task resumed");
        }

        self.orchestrator.step_granted(&mut state, None).await?;
        self.orchestrator
            .run(&mut state, None, &handle.pause_signal)
            .await?;
        Ok(state.snapshot())
    }

    /// Replaces the task's breakpoint set.
    pub async fn set_breakpoints(&self, id: Uuid, tags: Vec<String>) -> BatonResult<()> {
        let handle = self.handle(id).await?;
        let mut state = handle.state.lock().await;
        state.set_breakpoints(tags.into_iter().collect());
        self.orchestrator.store().save(&state).await?;
        info!(task_id = %id, breakpoints = ?state.breakpoints, "Breakpoints updated");
        Ok(())
    }

    /// Switches the task's execution mode. Takes effect at the next turn.
    pub async fn set_execution_mode(&self, id: Uuid, mode: ExecutionMode) -> BatonResult<()> {
        let handle = self.handle(id).await?;
        let mut state = handle.state.lock().await;
        state.set_execution_mode(mode);
        self.orchestrator.store().save(&state).await?;
        info!(task_id = %id, mode = %mode, "Execution mode changed");
        Ok(())
    }

    /// Appends a user message to history.
    ///
    /// Injected messages are operator input and are trusted: they bypass the
    /// guardrail gate, which covers agent output and the initial prompt only.
    pub async fn inject_user_message(&self, id: Uuid, text: &str) -> BatonResult<()> {
        let handle = self.handle(id).await?;
        let mut state = handle.state.lock().await;
        state.add_step(TaskStep::user(text));
        self.orchestrator.store().save(&state).await?;
        info!(task_id = %id, "User message injected");
        Ok(())
    }

    /// Forces the next turn to a specific agent, validated against the team.
    pub async fn override_next_agent(&self, id: Uuid, name: &str) -> BatonResult<()> {
        let handle = self.handle(id).await?;
        let mut state = handle.state.lock().await;
        let from = state.current_agent.clone().unwrap_or_default();
        state.set_current_agent(name, self.orchestrator.team())?;
        self.orchestrator.store().save(&state).await?;
        info!(task_id = %id, from = %from, to = %name, "Next agent overridden");
        Ok(())
    }

    /// Returns a deep snapshot of the task state for inspection.
    pub async fn inspect_task_state(&self, id: Uuid) -> BatonResult<TaskState> {
        let handle = self.handle(id).await?;
        let state = handle.state.lock().await;
        Ok(state.snapshot())
    }

    /// Removes the task from the cache and the store.
    pub async fn delete_task(&self, id: Uuid) -> BatonResult<()> {
        let cached = self.registry.write().await.remove(&id).is_some();
        let persisted = self.orchestrator.store().load(id).await?.is_some();
        if !cached && !persisted {
            return Err(BatonError::TaskNotFound(id));
        }
        self.orchestrator.store().delete(id).await?;
        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Number of tasks currently cached in the registry.
    pub async fn cached_task_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Resolves a task handle, sweeping idle entries first and falling back
    /// to the store for evicted or never-cached tasks.
    async fn handle(&self, id: Uuid) -> BatonResult<TaskHandle> {
        self.evict_idle().await;

        if let Some(handle) = self.registry.read().await.get(&id) {
            handle.touch();
            return Ok(handle.clone());
        }

        let Some(state) = self.orchestrator.store().load(id).await? else {
            return Err(BatonError::TaskNotFound(id));
        };
        info!(task_id = %id, "Reloaded task from store");

        let mut registry = self.registry.write().await;
        // A concurrent reload may have won the race; keep the first entry.
        let entry = registry.entry(id).or_insert_with(|| TaskHandle::new(state));
        entry.touch();
        Ok(entry.clone())
    }

    async fn evict_idle(&self) {
        let ttl = self.ttl;
        let mut registry = self.registry.write().await;
        registry.retain(|id, handle| {
            // An entry whose state lock is held is being driven; never evict.
            let keep = handle.idle_for() < ttl || handle.state.try_lock().is_err();
            if !keep {
                info!(task_id = %id, "Evicting idle task from cache");
            }
            keep
        });
    }

    async fn publish(&self, id: Uuid, kind: EventKind, data: serde_json::Value) {
        self.orchestrator
            .bus()
            .publish(Event::new(kind, "task_manager", id, data))
            .await;
    }
}
