//! WorkflowController - the public surface of the engine.
//!
//! A thin wrapper over the scheduler and the work-graph stores: create,
//! start, cancel, and observe workflows. All methods return immediately;
//! the long-running work happens on the scheduler loop. The controller
//! only reads Task and Agent records - the single mutation it performs
//! directly is flipping a workflow's cancellation flag (via the
//! scheduler's cancel path).

use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::agent::Agent;
use crate::models::task::{Task, TaskStatus};
use crate::models::workflow::{WorkflowStatusReport, WorkflowStatus};
use crate::schema::{AgentSpec, TaskSpec, WorkflowDefinition};
use crate::state::EngineState;

#[derive(Clone)]
pub struct WorkflowController {
    state: EngineState,
}

impl WorkflowController {
    pub fn new(state: EngineState) -> Self {
        Self { state }
    }

    // ─── Agent pool ─────────────────────────────────────────────────────

    /// Register an agent into the pool. Agents are engine-wide and serve
    /// tasks from any workflow.
    pub async fn register_agent(&self, spec: &AgentSpec) -> Agent {
        let agent = Agent::new(
            Uuid::new_v4().to_string(),
            spec.name.clone(),
            spec.role.clone(),
            spec.max_concurrent,
        );
        self.state.agents.save(&agent).await;
        tracing::info!(
            "[Controller] registered agent '{}' (role: {}, capacity: {})",
            agent.name,
            agent.role,
            agent.max_concurrent
        );
        agent
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.state.agents.list().await
    }

    // ─── Workflows ──────────────────────────────────────────────────────

    pub async fn create_workflow(
        &self,
        name: &str,
        owner: Option<&str>,
        specs: &[TaskSpec],
    ) -> Result<String, SchedulerError> {
        self.state.scheduler.create_workflow(name, owner, specs).await
    }

    /// Create a workflow from a parsed YAML definition, registering its
    /// agent pool first.
    pub async fn create_workflow_from_definition(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<String, SchedulerError> {
        for agent_spec in &definition.agents {
            self.register_agent(agent_spec).await;
        }
        self.create_workflow(
            &definition.name,
            definition.owner.as_deref(),
            &definition.tasks,
        )
        .await
    }

    pub async fn start_workflow(&self, workflow_id: &str) -> Result<(), SchedulerError> {
        self.state.scheduler.start_workflow(workflow_id).await
    }

    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<(), SchedulerError> {
        self.state.scheduler.cancel_workflow(workflow_id).await
    }

    // ─── Observation ────────────────────────────────────────────────────

    pub async fn get_task(&self, task_id: &str) -> Result<Task, SchedulerError> {
        self.state
            .tasks
            .get(task_id)
            .await
            .ok_or_else(|| SchedulerError::NotFound(format!("task {task_id}")))
    }

    pub async fn get_workflow_status(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowStatusReport, SchedulerError> {
        let workflow = self
            .state
            .workflows
            .get(workflow_id)
            .await
            .ok_or_else(|| SchedulerError::NotFound(format!("workflow {workflow_id}")))?;

        let tasks = self.state.tasks.list_by_workflow(workflow_id).await;
        let task_counts = self.state.tasks.counts_by_status(&workflow.task_ids).await;

        let progress = if tasks.is_empty() {
            0
        } else {
            let total: u32 = tasks.iter().map(|t| t.progress as u32).sum();
            (total / tasks.len() as u32) as u8
        };

        let mut active_agents: Vec<String> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .filter_map(|t| t.assigned_agent.clone())
            .collect();
        active_agents.sort();
        active_agents.dedup();

        Ok(WorkflowStatusReport {
            workflow_id: workflow.id,
            name: workflow.name,
            status: workflow.status,
            progress,
            task_counts,
            active_agents,
        })
    }

    /// Convenience for callers polling a workflow to quiescence.
    pub async fn workflow_status(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowStatus, SchedulerError> {
        self.state
            .workflows
            .get(workflow_id)
            .await
            .map(|w| w.status)
            .ok_or_else(|| SchedulerError::NotFound(format!("workflow {workflow_id}")))
    }
}
