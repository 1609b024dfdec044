//! End-to-end scheduling tests: a real engine, real scheduler loop, and
//! instrumented handlers. All tests run under a paused clock, so sleeps
//! and poll intervals resolve in virtual time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use conduct_core::cancel::sleep_cancellable;
use conduct_core::models::task::TaskStatus;
use conduct_core::models::workflow::WorkflowStatus;
use conduct_core::schema::{AgentSpec, TaskSpec};
use conduct_core::{
    Engine, EngineConfig, HandlerRegistry, TaskContext, TaskFailure, TaskHandler,
    WorkflowController,
};

// ─── Instrumented handler ───────────────────────────────────────────────

#[derive(Clone, Default)]
struct Probe {
    completions: Arc<Mutex<Vec<String>>>,
    invocations: Arc<Mutex<HashMap<String, u32>>>,
    inflight: Arc<AtomicUsize>,
    max_inflight: Arc<AtomicUsize>,
}

impl Probe {
    fn completions(&self) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }

    fn invocation_counts(&self) -> HashMap<String, u32> {
        self.invocations.lock().unwrap().clone()
    }

    fn max_inflight(&self) -> usize {
        self.max_inflight.load(Ordering::SeqCst)
    }
}

struct TestHandler {
    probe: Probe,
    delay: Duration,
    fail_tasks: HashSet<String>,
}

impl TestHandler {
    fn new(probe: Probe, delay: Duration) -> Self {
        Self {
            probe,
            delay,
            fail_tasks: HashSet::new(),
        }
    }

    fn failing(mut self, task_name: &str) -> Self {
        self.fail_tasks.insert(task_name.to_string());
        self
    }
}

#[async_trait]
impl TaskHandler for TestHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<serde_json::Value, TaskFailure> {
        *self
            .probe
            .invocations
            .lock()
            .unwrap()
            .entry(ctx.task.name.clone())
            .or_insert(0) += 1;

        let current = self.probe.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_inflight.fetch_max(current, Ordering::SeqCst);
        let finished = sleep_cancellable(self.delay, &ctx.cancel).await;
        self.probe.inflight.fetch_sub(1, Ordering::SeqCst);

        if !finished {
            return Err(TaskFailure::Cancelled);
        }
        if self.fail_tasks.contains(&ctx.task.name) {
            return Err(TaskFailure::Failed("simulated failure".to_string()));
        }
        self.probe
            .completions
            .lock()
            .unwrap()
            .push(ctx.task.name.clone());
        Ok(json!({ "done": ctx.task.name }))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn spec(name: &str, deps: &[&str]) -> TaskSpec {
    TaskSpec {
        id: None,
        name: name.to_string(),
        kind: "test".to_string(),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        priority: 0,
        preferred_role: None,
        params: serde_json::Value::Null,
    }
}

fn agent(name: &str, role: &str, max_concurrent: usize) -> AgentSpec {
    AgentSpec {
        name: name.to_string(),
        role: role.to_string(),
        max_concurrent,
    }
}

fn engine_with(handler: TestHandler) -> (Engine, Probe) {
    let probe = handler.probe.clone();
    let mut registry = HandlerRegistry::new();
    registry.register("test", Arc::new(handler)).unwrap();
    let engine = Engine::start(EngineConfig::default(), registry);
    (engine, probe)
}

async fn wait_terminal(controller: &WorkflowController, workflow_id: &str) -> WorkflowStatus {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let status = controller.workflow_status(workflow_id).await.unwrap();
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("workflow did not reach a terminal status")
}

async fn wait_running_tasks(controller: &WorkflowController, workflow_id: &str, n: usize) {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let report = controller.get_workflow_status(workflow_id).await.unwrap();
            if report.task_counts.running >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tasks never started running");
}

// ─── Tests ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn diamond_workflow_completes_in_dependency_order() {
    let (engine, probe) = engine_with(TestHandler::new(Probe::default(), Duration::from_millis(50)));
    let controller = engine.controller();
    controller.register_agent(&agent("w1", "general", 1)).await;
    controller.register_agent(&agent("w2", "general", 1)).await;

    let specs = vec![
        spec("t1", &[]),
        spec("t2", &["t1"]),
        spec("t3", &["t1", "t2"]),
    ];
    let workflow_id = controller
        .create_workflow("diamond", Some("tests"), &specs)
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();

    let status = wait_terminal(&controller, &workflow_id).await;
    assert_eq!(status, WorkflowStatus::Completed);

    let completions = probe.completions();
    assert_eq!(completions.len(), 3);
    assert_eq!(completions[0], "t1");
    assert_eq!(completions[2], "t3");

    let report = controller.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(report.task_counts.completed, 3);
    assert_eq!(report.task_counts.total(), 3);
    assert_eq!(report.progress, 100);
    assert!(report.active_agents.is_empty());

    // Every task ran exactly once.
    for (_, count) in probe.invocation_counts() {
        assert_eq!(count, 1);
    }
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn agent_concurrency_is_bounded() {
    let (engine, probe) =
        engine_with(TestHandler::new(Probe::default(), Duration::from_millis(200)));
    let controller = engine.controller();
    controller.register_agent(&agent("solo", "general", 2)).await;

    let specs: Vec<TaskSpec> = (0..6).map(|i| spec(&format!("t{i}"), &[])).collect();
    let workflow_id = controller
        .create_workflow("parallel", None, &specs)
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();

    let status = wait_terminal(&controller, &workflow_id).await;
    assert_eq!(status, WorkflowStatus::Completed);
    assert!(
        probe.max_inflight() <= 2,
        "observed {} concurrent tasks on an agent with capacity 2",
        probe.max_inflight()
    );
    assert_eq!(probe.completions().len(), 6);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn preferred_role_wins_agent_selection() {
    let (engine, _probe) =
        engine_with(TestHandler::new(Probe::default(), Duration::from_millis(10)));
    let controller = engine.controller();
    controller.register_agent(&agent("any", "general", 4)).await;
    let fetcher = controller.register_agent(&agent("fetch", "fetcher", 1)).await;

    let mut fetch_spec = spec("fetch-quotes", &[]);
    fetch_spec.preferred_role = Some("fetcher".to_string());
    let workflow_id = controller
        .create_workflow("roles", None, &[fetch_spec])
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();
    wait_terminal(&controller, &workflow_id).await;

    let report = controller.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(report.status, WorkflowStatus::Completed);
    // The completed task still records which agent ran it.
    let tasks = engine.state().tasks.list_by_workflow(&workflow_id).await;
    assert_eq!(tasks[0].assigned_agent.as_deref(), Some(fetcher.id.as_str()));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_idempotent_and_sticky() {
    let (engine, probe) = engine_with(TestHandler::new(Probe::default(), Duration::from_secs(600)));
    let controller = engine.controller();
    controller.register_agent(&agent("w1", "general", 2)).await;

    let specs = vec![spec("t1", &[]), spec("t2", &[]), spec("t3", &["t1", "t2"])];
    let workflow_id = controller
        .create_workflow("cancel-me", None, &specs)
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();
    wait_running_tasks(&controller, &workflow_id, 2).await;

    controller.cancel_workflow(&workflow_id).await.unwrap();
    // Second cancel is a no-op, not an error.
    controller.cancel_workflow(&workflow_id).await.unwrap();

    let status = wait_terminal(&controller, &workflow_id).await;
    assert_eq!(status, WorkflowStatus::Cancelled);

    // Give in-flight handlers time to unwind, then check nothing moved.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let report = controller.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(report.task_counts.cancelled, 3);
    assert_eq!(report.task_counts.total(), 3);
    assert!(probe.completions().is_empty());

    // Agents were released.
    for agent in controller.list_agents().await {
        assert!(agent.assigned_tasks.is_empty());
    }
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn no_agent_available_fails_after_requeue_budget() {
    let (engine, _probe) =
        engine_with(TestHandler::new(Probe::default(), Duration::from_millis(10)));
    let controller = engine.controller();
    // No agents registered at all.

    let workflow_id = controller
        .create_workflow("starved", None, &[spec("t1", &[])])
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();

    let status = wait_terminal(&controller, &workflow_id).await;
    assert_eq!(status, WorkflowStatus::Failed);

    let tasks = engine.state().tasks.list_by_workflow(&workflow_id).await;
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[0].error.as_deref(), Some("no agent available"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn failed_dependency_cancels_descendants_but_not_siblings() {
    let handler = TestHandler::new(Probe::default(), Duration::from_millis(20)).failing("t1");
    let (engine, probe) = engine_with(handler);
    let controller = engine.controller();
    controller.register_agent(&agent("w1", "general", 2)).await;

    let specs = vec![
        spec("t1", &[]),
        spec("t2", &["t1"]),
        spec("t3", &["t2"]),
        spec("independent", &[]),
    ];
    let workflow_id = controller
        .create_workflow("partial-failure", None, &specs)
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();

    let status = wait_terminal(&controller, &workflow_id).await;
    assert_eq!(status, WorkflowStatus::Failed);

    let tasks = engine.state().tasks.list_by_workflow(&workflow_id).await;
    let by_name: HashMap<String, TaskStatus> = tasks
        .iter()
        .map(|t| (t.name.clone(), t.status))
        .collect();
    assert_eq!(by_name["t1"], TaskStatus::Failed);
    assert_eq!(by_name["t2"], TaskStatus::Cancelled);
    assert_eq!(by_name["t3"], TaskStatus::Cancelled);
    // A sibling with no dependency on the failure still runs to completion.
    assert_eq!(by_name["independent"], TaskStatus::Completed);
    assert_eq!(probe.completions(), vec!["independent".to_string()]);

    let t2 = tasks.iter().find(|t| t.name == "t2").unwrap();
    assert!(t2.error.as_deref().unwrap().contains("did not complete"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn status_snapshot_stays_consistent_mid_flight() {
    let (engine, _probe) =
        engine_with(TestHandler::new(Probe::default(), Duration::from_millis(300)));
    let controller = engine.controller();
    controller.register_agent(&agent("w1", "general", 1)).await;

    let specs = vec![spec("t1", &[]), spec("t2", &["t1"]), spec("t3", &["t2"])];
    let workflow_id = controller
        .create_workflow("snapshots", None, &specs)
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();

    // Sample the report repeatedly while the workflow advances; the
    // counts must always sum to the task total.
    for _ in 0..30 {
        let report = controller.get_workflow_status(&workflow_id).await.unwrap();
        assert_eq!(report.task_counts.total(), 3);
        if report.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let status = wait_terminal(&controller, &workflow_id).await;
    assert_eq!(status, WorkflowStatus::Completed);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn invalid_specs_are_rejected_before_creation() {
    let (engine, _probe) =
        engine_with(TestHandler::new(Probe::default(), Duration::from_millis(10)));
    let controller = engine.controller();

    // Unknown dependency.
    let err = controller
        .create_workflow("bad-dep", None, &[spec("t1", &["ghost"])])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown task"));

    // Cycle.
    let err = controller
        .create_workflow(
            "cyclic",
            None,
            &[spec("a", &["b"]), spec("b", &["a"])],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cycle"));

    // Unregistered handler kind.
    let mut alien = spec("t1", &[]);
    alien.kind = "alien".to_string();
    let err = controller
        .create_workflow("bad-kind", None, &[alien])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unregistered"));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn start_workflow_validates_state() {
    let (engine, _probe) =
        engine_with(TestHandler::new(Probe::default(), Duration::from_millis(10)));
    let controller = engine.controller();
    controller.register_agent(&agent("w1", "general", 1)).await;

    assert!(controller.start_workflow("nope").await.is_err());

    let workflow_id = controller
        .create_workflow("once", None, &[spec("t1", &[])])
        .await
        .unwrap();
    controller.start_workflow(&workflow_id).await.unwrap();
    // Starting twice is an invalid state transition.
    let err = controller.start_workflow(&workflow_id).await.unwrap_err();
    assert!(err.to_string().contains("Invalid state"));

    wait_terminal(&controller, &workflow_id).await;
    engine.shutdown();
}
