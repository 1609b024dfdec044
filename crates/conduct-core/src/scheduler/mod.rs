//! The scheduler - single owner of all work-graph mutation.
//!
//! One spawned loop multiplexes over the ready queue, the completion
//! channel fed by in-flight handlers, and a periodic tick (so shutdown and
//! deferred assignments are noticed within a bounded interval). Handlers
//! run in their own tasks but report back exclusively through the
//! completion channel; nothing outside this loop writes Task or Agent
//! records once a workflow is running.
//!
//! Ready tasks are served highest-priority first, FIFO within a tier.
//! Priority is an ordering hint only - running tasks are never preempted.

pub mod handler;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::SchedulerError;
use crate::events::{EngineEvent, EngineEventType, EventBus};
use crate::executor::ResilientExecutor;
use crate::models::task::{Task, TaskStatus};
use crate::models::workflow::{Workflow, WorkflowStatus};
use crate::schema::TaskSpec;
use crate::store::{AgentStore, TaskStore, WorkflowStore};

use handler::{HandlerRegistry, TaskContext, TaskFailure};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Idle tick of the loop; bounds how fast shutdown and deferred
    /// assignment retries are noticed.
    pub poll_interval: Duration,
    /// How many queue cycles a ready task survives without an available
    /// agent before it is failed.
    pub max_requeue_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_requeue_attempts: 5,
        }
    }
}

enum SchedulerMsg {
    /// A workflow was started; seed its ready tasks.
    SeedWorkflow { workflow_id: String },
    /// A workflow was cancelled; sweep its non-terminal tasks.
    CancelWorkflow { workflow_id: String },
    /// An in-flight handler finished.
    TaskFinished {
        task_id: String,
        workflow_id: String,
        agent_id: String,
        outcome: Result<serde_json::Value, TaskFailure>,
    },
}

/// Heap entry for the ready queue: highest priority first, FIFO within a
/// tier (by enqueue sequence).
struct ReadyEntry {
    task_id: String,
    workflow_id: String,
    priority: i32,
    seq: u64,
    attempts: u32,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReadyEntry {}

#[derive(Default)]
struct LoopState {
    ready: BinaryHeap<ReadyEntry>,
    /// Entries that found no agent this cycle; retried next cycle.
    deferred: Vec<ReadyEntry>,
    /// Task ids currently sitting in the ready queue, so a readiness
    /// rescan never enqueues a task twice.
    queued: HashSet<String>,
    seq: u64,
}

/// Handle to the scheduling engine. Cheap to clone; all clones share the
/// same loop.
#[derive(Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    tasks: TaskStore,
    agents: AgentStore,
    workflows: WorkflowStore,
    registry: HandlerRegistry,
    executor: Arc<ResilientExecutor>,
    events: EventBus,
    tx: mpsc::UnboundedSender<SchedulerMsg>,
    /// Workflow id -> cancellation token, created at start time.
    tokens: Arc<RwLock<HashMap<String, CancelToken>>>,
    shutdown: CancelToken,
}

impl Scheduler {
    /// Build the scheduler and spawn its loop. Must be called from within
    /// a tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        config: SchedulerConfig,
        tasks: TaskStore,
        agents: AgentStore,
        workflows: WorkflowStore,
        registry: HandlerRegistry,
        executor: Arc<ResilientExecutor>,
        events: EventBus,
        shutdown: CancelToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            config,
            tasks,
            agents,
            workflows,
            registry,
            executor,
            events,
            tx,
            tokens: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
        };
        let looper = scheduler.clone();
        tokio::spawn(async move { looper.run(rx).await });
        scheduler
    }

    // ─── Public contract ────────────────────────────────────────────────

    /// Build Task and Workflow records, all pending. Does not start
    /// execution. The spec list is validated eagerly: duplicate ids,
    /// unknown dependencies, self-references, unregistered handler kinds,
    /// and dependency cycles are all rejected here.
    pub async fn create_workflow(
        &self,
        name: &str,
        owner: Option<&str>,
        specs: &[TaskSpec],
    ) -> Result<String, SchedulerError> {
        validate_specs(specs, &self.registry)?;

        let workflow_id = Uuid::new_v4().to_string();
        let id_map: HashMap<String, String> = specs
            .iter()
            .map(|s| (s.local_id().to_string(), Uuid::new_v4().to_string()))
            .collect();

        let mut task_ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = id_map[spec.local_id()].clone();
            let dependencies = spec
                .depends_on
                .iter()
                .map(|dep| id_map[dep.as_str()].clone())
                .collect();
            let task = Task::new(
                id.clone(),
                spec.name.clone(),
                spec.kind.clone(),
                workflow_id.clone(),
                dependencies,
                spec.params.clone(),
                spec.priority,
                spec.preferred_role.clone(),
            );
            self.tasks.save(&task).await;
            task_ids.push(id);
        }

        let workflow = Workflow::new(
            workflow_id.clone(),
            name.to_string(),
            task_ids,
            owner.map(String::from),
        );
        self.workflows.save(&workflow).await;
        tracing::info!(
            "[Scheduler] created workflow '{}' ({}) with {} task(s)",
            name,
            workflow_id,
            specs.len()
        );
        Ok(workflow_id)
    }

    /// Mark the workflow running and seed every currently-ready task.
    pub async fn start_workflow(&self, workflow_id: &str) -> Result<(), SchedulerError> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await
            .ok_or_else(|| SchedulerError::NotFound(format!("workflow {workflow_id}")))?;
        if workflow.status != WorkflowStatus::Pending {
            return Err(SchedulerError::InvalidState(format!(
                "workflow {} is {}, expected PENDING",
                workflow_id,
                workflow.status.as_str()
            )));
        }

        self.tokens
            .write()
            .await
            .insert(workflow_id.to_string(), CancelToken::new());
        self.workflows
            .update(workflow_id, |w| {
                w.status = WorkflowStatus::Running;
                w.started_at = Some(Utc::now());
            })
            .await;

        tracing::info!("[Scheduler] started workflow {}", workflow_id);
        self.events
            .emit(EngineEvent::new(
                EngineEventType::WorkflowStarted,
                workflow_id,
            ))
            .await;
        let _ = self.tx.send(SchedulerMsg::SeedWorkflow {
            workflow_id: workflow_id.to_string(),
        });
        Ok(())
    }

    /// Cancel a workflow: the cancellation flag flips immediately, the
    /// loop sweeps every non-terminal task, and in-flight handlers unwind
    /// at their next checkpoint. Idempotent - cancelling a cancelled
    /// workflow is a no-op.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<(), SchedulerError> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await
            .ok_or_else(|| SchedulerError::NotFound(format!("workflow {workflow_id}")))?;
        match workflow.status {
            WorkflowStatus::Cancelled => return Ok(()),
            WorkflowStatus::Completed | WorkflowStatus::Failed => {
                return Err(SchedulerError::InvalidState(format!(
                    "workflow {} already finished as {}",
                    workflow_id,
                    workflow.status.as_str()
                )));
            }
            WorkflowStatus::Pending | WorkflowStatus::Running => {}
        }

        self.workflows
            .update(workflow_id, |w| {
                w.status = WorkflowStatus::Cancelled;
                w.completed_at = Some(Utc::now());
            })
            .await;
        if let Some(token) = self.tokens.read().await.get(workflow_id) {
            token.cancel();
        }

        tracing::info!("[Scheduler] cancelled workflow {}", workflow_id);
        self.events
            .emit(EngineEvent::new(
                EngineEventType::WorkflowCancelled,
                workflow_id,
            ))
            .await;
        let _ = self.tx.send(SchedulerMsg::CancelWorkflow {
            workflow_id: workflow_id.to_string(),
        });
        Ok(())
    }

    // ─── Loop ───────────────────────────────────────────────────────────

    async fn run(self, mut rx: mpsc::UnboundedReceiver<SchedulerMsg>) {
        let mut state = LoopState::default();
        tracing::info!("[Scheduler] loop started");
        loop {
            let msg = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => Some(msg),
                    None => break,
                },
                _ = tokio::time::sleep(self.config.poll_interval) => None,
            };
            if let Some(msg) = msg {
                self.handle_msg(msg, &mut state).await;
                // Drain whatever else arrived before the dispatch pass.
                while let Ok(next) = rx.try_recv() {
                    self.handle_msg(next, &mut state).await;
                }
            }
            // One queue cycle has passed: deferred entries get another shot.
            state.ready.extend(state.deferred.drain(..));
            self.dispatch_ready(&mut state).await;
        }
        tracing::info!("[Scheduler] loop stopped");
    }

    async fn handle_msg(&self, msg: SchedulerMsg, state: &mut LoopState) {
        match msg {
            SchedulerMsg::SeedWorkflow { workflow_id } => {
                self.enqueue_ready(&workflow_id, state).await;
            }
            SchedulerMsg::CancelWorkflow { workflow_id } => {
                self.sweep_cancelled_workflow(&workflow_id, state).await;
            }
            SchedulerMsg::TaskFinished {
                task_id,
                workflow_id,
                agent_id,
                outcome,
            } => {
                self.agents.release(&agent_id, &task_id).await;
                self.apply_outcome(&task_id, outcome).await;
                self.after_task_terminal(&workflow_id, state).await;
            }
        }
    }

    /// Record a handler outcome. Only a running task may transition; a
    /// task already swept by workflow cancellation keeps its state.
    async fn apply_outcome(&self, task_id: &str, outcome: Result<serde_json::Value, TaskFailure>) {
        let Some(task) = self.tasks.get(task_id).await else {
            return;
        };
        if task.status != TaskStatus::Running {
            return;
        }
        match outcome {
            Ok(result) => {
                let updated = self
                    .tasks
                    .update(task_id, |t| {
                        t.status = TaskStatus::Completed;
                        t.result = Some(result);
                        t.progress = 100;
                        t.completed_at = Some(Utc::now());
                    })
                    .await;
                let duration_ms = updated
                    .as_ref()
                    .and_then(|t| t.duration())
                    .map(|d| d.num_milliseconds().max(0) as u64)
                    .unwrap_or(0);
                tracing::info!("[Scheduler] task {} completed in {}ms", task_id, duration_ms);
                self.events
                    .emit(
                        EngineEvent::new(EngineEventType::TaskCompleted, task_id)
                            .with_duration_ms(duration_ms),
                    )
                    .await;
            }
            Err(TaskFailure::Cancelled) => {
                self.tasks
                    .update(task_id, |t| {
                        t.status = TaskStatus::Cancelled;
                        t.error = Some("task cancelled".to_string());
                        t.completed_at = Some(Utc::now());
                    })
                    .await;
                self.events
                    .emit(EngineEvent::new(EngineEventType::TaskCancelled, task_id))
                    .await;
            }
            Err(TaskFailure::Failed(message)) => {
                tracing::warn!("[Scheduler] task {} failed: {}", task_id, message);
                self.tasks
                    .update(task_id, |t| {
                        t.status = TaskStatus::Failed;
                        t.error = Some(message.clone());
                        t.completed_at = Some(Utc::now());
                    })
                    .await;
                self.events
                    .emit(
                        EngineEvent::new(EngineEventType::TaskFailed, task_id)
                            .with_data(serde_json::json!({ "error": message })),
                    )
                    .await;
            }
        }
    }

    /// Everything that follows a task reaching a terminal status: cancel
    /// dependents that can never run, enqueue newly-ready tasks, and
    /// finalize the workflow once every task is terminal.
    async fn after_task_terminal(&self, workflow_id: &str, state: &mut LoopState) {
        let Some(workflow) = self.workflows.get(workflow_id).await else {
            return;
        };
        if workflow.status == WorkflowStatus::Running {
            self.cascade_dead_dependents(&workflow, state).await;
            self.enqueue_ready(workflow_id, state).await;
        }
        self.try_finalize(workflow_id).await;
    }

    /// Pending tasks depending on a failed or cancelled task can never
    /// become ready; cancel them (transitively) so the workflow always
    /// reaches a terminal status.
    async fn cascade_dead_dependents(&self, workflow: &Workflow, state: &mut LoopState) {
        loop {
            let tasks = self.tasks.list_by_workflow(&workflow.id).await;
            let dead: HashMap<&str, &str> = tasks
                .iter()
                .filter(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Cancelled))
                .map(|t| (t.id.as_str(), t.name.as_str()))
                .collect();
            if dead.is_empty() {
                return;
            }

            let mut changed = false;
            for task in tasks.iter().filter(|t| t.status == TaskStatus::Pending) {
                let Some(dead_dep) = task
                    .dependencies
                    .iter()
                    .find(|dep| dead.contains_key(dep.as_str()))
                else {
                    continue;
                };
                let dep_name = dead[dead_dep.as_str()];
                self.tasks
                    .update(&task.id, |t| {
                        t.status = TaskStatus::Cancelled;
                        t.error = Some(format!("dependency '{dep_name}' did not complete"));
                        t.completed_at = Some(Utc::now());
                    })
                    .await;
                state.queued.remove(&task.id);
                self.events
                    .emit(EngineEvent::new(EngineEventType::TaskCancelled, &task.id))
                    .await;
                changed = true;
            }
            if !changed {
                return;
            }
        }
    }

    /// Readiness rescan: enqueue every pending task whose dependencies
    /// are all completed and which is not already queued. Runs on every
    /// completion event, in discovery order.
    async fn enqueue_ready(&self, workflow_id: &str, state: &mut LoopState) {
        let Some(workflow) = self.workflows.get(workflow_id).await else {
            return;
        };
        if workflow.status != WorkflowStatus::Running {
            return;
        }
        for task in self.tasks.find_ready_tasks(&workflow.task_ids).await {
            if !state.queued.insert(task.id.clone()) {
                continue;
            }
            state.seq += 1;
            state.ready.push(ReadyEntry {
                task_id: task.id,
                workflow_id: workflow_id.to_string(),
                priority: task.priority,
                seq: state.seq,
                attempts: 0,
            });
        }
    }

    /// Assignment pass over the ready queue.
    async fn dispatch_ready(&self, state: &mut LoopState) {
        let mut retry_later: Vec<ReadyEntry> = Vec::new();

        while let Some(mut entry) = state.ready.pop() {
            let Some(task) = self.tasks.get(&entry.task_id).await else {
                state.queued.remove(&entry.task_id);
                continue;
            };
            if task.status != TaskStatus::Pending {
                state.queued.remove(&entry.task_id);
                continue;
            }
            // Cancellation is checked before a task ever starts; the
            // cancel sweep will pick the task up.
            let workflow_running = self
                .workflows
                .get(&entry.workflow_id)
                .await
                .map(|w| w.status == WorkflowStatus::Running)
                .unwrap_or(false);
            let token = self.token_for(&entry.workflow_id).await;
            if !workflow_running || token.is_cancelled() {
                state.queued.remove(&entry.task_id);
                continue;
            }

            let Some(agent) = self
                .agents
                .select_available(task.preferred_role.as_deref())
                .await
            else {
                if entry.attempts >= self.config.max_requeue_attempts {
                    state.queued.remove(&entry.task_id);
                    self.fail_no_agent(&task).await;
                    self.after_task_terminal(&entry.workflow_id, state).await;
                } else {
                    entry.attempts += 1;
                    retry_later.push(entry);
                }
                continue;
            };

            if !self.agents.assign(&agent.id, &task.id).await {
                // Capacity raced away within this pass; try again next cycle.
                entry.attempts += 1;
                retry_later.push(entry);
                continue;
            }

            state.queued.remove(&entry.task_id);
            let started = self
                .tasks
                .update(&task.id, |t| {
                    t.status = TaskStatus::Running;
                    t.assigned_agent = Some(agent.id.clone());
                    t.started_at = Some(Utc::now());
                })
                .await;
            let Some(started) = started else {
                self.agents.release(&agent.id, &task.id).await;
                continue;
            };

            tracing::info!(
                "[Scheduler] task {} ('{}') -> agent {} ('{}')",
                started.id,
                started.name,
                agent.id,
                agent.name
            );
            self.events
                .emit(
                    EngineEvent::new(EngineEventType::TaskStarted, &started.id)
                        .with_data(serde_json::json!({ "agentId": agent.id })),
                )
                .await;

            let Some(task_handler) = self.registry.get(&started.kind) else {
                // Kinds are validated at creation; an unregistered kind here
                // means the registry handed out at construction was replaced.
                self.agents.release(&agent.id, &task.id).await;
                self.apply_outcome(
                    &started.id,
                    Err(TaskFailure::Failed(format!(
                        "no handler registered for kind '{}'",
                        started.kind
                    ))),
                )
                .await;
                self.after_task_terminal(&entry.workflow_id, state).await;
                continue;
            };

            let ctx = TaskContext {
                task: started.clone(),
                cancel: token.clone(),
                executor: self.executor.clone(),
            };
            let tx = self.tx.clone();
            let task_id = started.id.clone();
            let workflow_id = entry.workflow_id.clone();
            let agent_id = agent.id.clone();
            tokio::spawn(async move {
                let outcome = task_handler.handle(ctx).await;
                let _ = tx.send(SchedulerMsg::TaskFinished {
                    task_id,
                    workflow_id,
                    agent_id,
                    outcome,
                });
            });
        }

        state.deferred.extend(retry_later);
    }

    async fn fail_no_agent(&self, task: &Task) {
        tracing::warn!(
            "[Scheduler] no agent available for task {} ('{}') after {} cycles",
            task.id,
            task.name,
            self.config.max_requeue_attempts
        );
        self.tasks
            .update(&task.id, |t| {
                t.status = TaskStatus::Failed;
                t.error = Some("no agent available".to_string());
                t.completed_at = Some(Utc::now());
            })
            .await;
        self.events
            .emit(
                EngineEvent::new(EngineEventType::TaskFailed, &task.id)
                    .with_data(serde_json::json!({ "error": "no agent available" })),
            )
            .await;
    }

    /// Sweep every non-terminal task of a cancelled workflow.
    async fn sweep_cancelled_workflow(&self, workflow_id: &str, state: &mut LoopState) {
        for task in self.tasks.list_by_workflow(workflow_id).await {
            if task.status.is_terminal() {
                continue;
            }
            if let Some(agent_id) = &task.assigned_agent {
                self.agents.release(agent_id, &task.id).await;
            }
            self.tasks
                .update(&task.id, |t| {
                    t.status = TaskStatus::Cancelled;
                    t.error = Some("workflow cancelled".to_string());
                    t.assigned_agent = None;
                    t.completed_at = Some(Utc::now());
                })
                .await;
            state.queued.remove(&task.id);
            self.events
                .emit(EngineEvent::new(EngineEventType::TaskCancelled, &task.id))
                .await;
        }
        self.tokens.write().await.remove(workflow_id);
    }

    /// Once every task is terminal, the workflow is too: failed if any
    /// task failed, completed otherwise. Cancelled workflows already hold
    /// their terminal status.
    async fn try_finalize(&self, workflow_id: &str) {
        let Some(workflow) = self.workflows.get(workflow_id).await else {
            return;
        };
        if workflow.status != WorkflowStatus::Running {
            return;
        }
        let tasks = self.tasks.list_by_workflow(workflow_id).await;
        if !tasks.iter().all(|t| t.status.is_terminal()) {
            return;
        }
        let any_failed = tasks.iter().any(|t| t.status == TaskStatus::Failed);
        let (status, event_type) = if any_failed {
            (WorkflowStatus::Failed, EngineEventType::WorkflowFailed)
        } else {
            (WorkflowStatus::Completed, EngineEventType::WorkflowCompleted)
        };
        self.workflows
            .update(workflow_id, |w| {
                w.status = status;
                w.completed_at = Some(Utc::now());
            })
            .await;
        self.tokens.write().await.remove(workflow_id);
        tracing::info!(
            "[Scheduler] workflow {} finished as {}",
            workflow_id,
            status.as_str()
        );
        self.events
            .emit(EngineEvent::new(event_type, workflow_id))
            .await;
    }

    async fn token_for(&self, workflow_id: &str) -> CancelToken {
        self.tokens
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .unwrap_or_default()
    }
}

// ─── Spec validation ────────────────────────────────────────────────────

/// Validate a task spec list before any record is created.
fn validate_specs(specs: &[TaskSpec], registry: &HandlerRegistry) -> Result<(), SchedulerError> {
    if specs.is_empty() {
        return Err(SchedulerError::InvalidSpec(
            "workflow has no tasks".to_string(),
        ));
    }

    let mut ids: HashSet<&str> = HashSet::new();
    for spec in specs {
        if !ids.insert(spec.local_id()) {
            return Err(SchedulerError::InvalidSpec(format!(
                "duplicate task id '{}'",
                spec.local_id()
            )));
        }
        if !registry.contains(&spec.kind) {
            return Err(SchedulerError::InvalidSpec(format!(
                "task '{}' uses unregistered kind '{}'",
                spec.local_id(),
                spec.kind
            )));
        }
    }
    for spec in specs {
        for dep in &spec.depends_on {
            if dep == spec.local_id() {
                return Err(SchedulerError::InvalidSpec(format!(
                    "task '{}' depends on itself",
                    spec.local_id()
                )));
            }
            if !ids.contains(dep.as_str()) {
                return Err(SchedulerError::InvalidSpec(format!(
                    "task '{}' depends on unknown task '{}'",
                    spec.local_id(),
                    dep
                )));
            }
        }
    }
    if let Some(task_id) = find_cycle(specs) {
        return Err(SchedulerError::InvalidSpec(format!(
            "dependency cycle through task '{task_id}'"
        )));
    }
    Ok(())
}

/// Iterative depth-first search over the spec graph; returns a task id on
/// a cycle path, if any.
fn find_cycle(specs: &[TaskSpec]) -> Option<String> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    let index: HashMap<&str, &TaskSpec> =
        specs.iter().map(|s| (s.local_id(), s)).collect();
    let mut color: HashMap<&str, u8> =
        specs.iter().map(|s| (s.local_id(), WHITE)).collect();

    for start in specs {
        if color[start.local_id()] != WHITE {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(start.local_id(), 0)];
        color.insert(start.local_id(), GRAY);
        while let Some(&(id, next)) = stack.last() {
            let deps = &index[id].depends_on;
            if next < deps.len() {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                let dep = deps[next].as_str();
                match color[dep] {
                    GRAY => return Some(dep.to_string()),
                    WHITE => {
                        color.insert(dep, GRAY);
                        stack.push((dep, 0));
                    }
                    _ => {}
                }
            } else {
                color.insert(id, BLACK);
                stack.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl handler::TaskHandler for NoopHandler {
        async fn handle(
            &self,
            _ctx: TaskContext,
        ) -> Result<serde_json::Value, TaskFailure> {
            Ok(serde_json::Value::Null)
        }
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register("noop", Arc::new(NoopHandler)).unwrap();
        registry
    }

    fn spec(id: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            id: Some(id.to_string()),
            name: id.to_string(),
            kind: "noop".to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            priority: 0,
            preferred_role: None,
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn validate_accepts_a_dag() {
        let specs = vec![
            spec("t1", &[]),
            spec("t2", &["t1"]),
            spec("t3", &["t1", "t2"]),
        ];
        assert!(validate_specs(&specs, &registry()).is_ok());
    }

    #[test]
    fn validate_rejects_empty_and_duplicates() {
        assert!(matches!(
            validate_specs(&[], &registry()),
            Err(SchedulerError::InvalidSpec(_))
        ));
        let specs = vec![spec("t1", &[]), spec("t1", &[])];
        assert!(matches!(
            validate_specs(&specs, &registry()),
            Err(SchedulerError::InvalidSpec(_))
        ));
    }

    #[test]
    fn validate_rejects_unknown_dependency_and_kind() {
        let specs = vec![spec("t1", &["ghost"])];
        assert!(matches!(
            validate_specs(&specs, &registry()),
            Err(SchedulerError::InvalidSpec(_))
        ));

        let mut bad_kind = spec("t1", &[]);
        bad_kind.kind = "mystery".to_string();
        assert!(matches!(
            validate_specs(&[bad_kind], &registry()),
            Err(SchedulerError::InvalidSpec(_))
        ));
    }

    #[test]
    fn validate_rejects_self_reference_and_cycles() {
        let specs = vec![spec("t1", &["t1"])];
        assert!(matches!(
            validate_specs(&specs, &registry()),
            Err(SchedulerError::InvalidSpec(_))
        ));

        let specs = vec![
            spec("t1", &["t3"]),
            spec("t2", &["t1"]),
            spec("t3", &["t2"]),
        ];
        let err = validate_specs(&specs, &registry()).unwrap_err();
        match err {
            SchedulerError::InvalidSpec(msg) => assert!(msg.contains("cycle")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ready_entries_order_by_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        for (priority, seq, id) in [(0, 1, "a"), (5, 2, "b"), (0, 3, "c"), (5, 4, "d")] {
            heap.push(ReadyEntry {
                task_id: id.to_string(),
                workflow_id: "wf".to_string(),
                priority,
                seq,
                attempts: 0,
            });
        }
        let order: Vec<String> = std::iter::from_fn(|| heap.pop().map(|e| e.task_id)).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }
}
