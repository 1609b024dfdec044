//! Engine wiring - explicit construction and teardown.
//!
//! There is no process-wide singleton: everything the engine needs lives
//! in an [`EngineState`] built by [`Engine::start`] and passed by
//! reference to whoever needs it. Dropping the engine after `shutdown`
//! stops the scheduler loop.

use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::controller::WorkflowController;
use crate::events::EventBus;
use crate::executor::{ExecutorConfig, ResilientExecutor};
use crate::scheduler::handler::HandlerRegistry;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::store::{AgentStore, TaskStore, WorkflowStore};

/// Engine-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
}

/// Shared state accessible to the controller and the scheduler loop.
pub struct EngineStateInner {
    pub tasks: TaskStore,
    pub agents: AgentStore,
    pub workflows: WorkflowStore,
    pub events: EventBus,
    pub executor: Arc<ResilientExecutor>,
    pub scheduler: Scheduler,
}

pub type EngineState = Arc<EngineStateInner>;

/// The assembled engine: stores, executor, event bus, and the scheduler
/// loop, plus the shutdown token that tears the loop down.
pub struct Engine {
    state: EngineState,
    shutdown: CancelToken,
}

impl Engine {
    /// Wire up the engine and spawn the scheduler loop. The registry must
    /// already hold a handler for every task kind workflows will use -
    /// specs naming other kinds are rejected with `InvalidSpec` at
    /// `create_workflow` time. Must be called from within a tokio runtime.
    pub fn start(config: EngineConfig, registry: HandlerRegistry) -> Self {
        let tasks = TaskStore::new();
        let agents = AgentStore::new();
        let workflows = WorkflowStore::new();
        let events = EventBus::new();
        let executor = Arc::new(ResilientExecutor::new(config.executor, events.clone()));
        let shutdown = CancelToken::new();

        let scheduler = Scheduler::start(
            config.scheduler,
            tasks.clone(),
            agents.clone(),
            workflows.clone(),
            registry,
            executor.clone(),
            events.clone(),
            shutdown.clone(),
        );

        let state = Arc::new(EngineStateInner {
            tasks,
            agents,
            workflows,
            events,
            executor,
            scheduler,
        });
        Self { state, shutdown }
    }

    pub fn state(&self) -> EngineState {
        self.state.clone()
    }

    pub fn controller(&self) -> WorkflowController {
        WorkflowController::new(self.state.clone())
    }

    pub fn events(&self) -> &EventBus {
        &self.state.events
    }

    /// Stop the scheduler loop. In-flight handlers finish on their own,
    /// but no further assignment or state transition happens.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
