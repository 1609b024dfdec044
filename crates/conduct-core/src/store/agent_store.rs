use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::agent::Agent;

#[derive(Clone, Default)]
pub struct AgentStore {
    inner: Arc<RwLock<HashMap<String, Agent>>>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, agent: &Agent) {
        let mut inner = self.inner.write().await;
        inner.insert(agent.id.clone(), agent.clone());
    }

    pub async fn get(&self, agent_id: &str) -> Option<Agent> {
        let inner = self.inner.read().await;
        inner.get(agent_id).cloned()
    }

    pub async fn list(&self) -> Vec<Agent> {
        let inner = self.inner.read().await;
        let mut agents: Vec<Agent> = inner.values().cloned().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    /// Pick an agent with spare capacity. Agents whose role matches
    /// `preferred_role` win; otherwise any agent with capacity is taken.
    /// Selection and assignment both run on the scheduler loop, so the
    /// two-step read/assign is race-free.
    pub async fn select_available(&self, preferred_role: Option<&str>) -> Option<Agent> {
        let agents = self.list().await;
        if let Some(role) = preferred_role {
            if let Some(agent) = agents
                .iter()
                .find(|a| a.role == role && a.has_capacity())
            {
                return Some(agent.clone());
            }
        }
        agents.into_iter().find(|a| a.has_capacity())
    }

    /// Assign a task, respecting `max_concurrent`. Returns false when the
    /// agent is unknown or already at capacity.
    pub async fn assign(&self, agent_id: &str, task_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(agent) = inner.get_mut(agent_id) else {
            return false;
        };
        if !agent.has_capacity() {
            return false;
        }
        agent.assigned_tasks.push(task_id.to_string());
        agent.updated_at = Utc::now();
        true
    }

    /// Release a task from its agent. No-op if not assigned.
    pub async fn release(&self, agent_id: &str, task_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(agent) = inner.get_mut(agent_id) {
            agent.assigned_tasks.retain(|id| id != task_id);
            agent.updated_at = Utc::now();
        }
    }
}
