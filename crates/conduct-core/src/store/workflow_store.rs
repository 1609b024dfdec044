use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::workflow::Workflow;

#[derive(Clone, Default)]
pub struct WorkflowStore {
    inner: Arc<RwLock<HashMap<String, Workflow>>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, workflow: &Workflow) {
        let mut inner = self.inner.write().await;
        inner.insert(workflow.id.clone(), workflow.clone());
    }

    pub async fn get(&self, workflow_id: &str) -> Option<Workflow> {
        let inner = self.inner.read().await;
        inner.get(workflow_id).cloned()
    }

    pub async fn list(&self) -> Vec<Workflow> {
        let inner = self.inner.read().await;
        let mut workflows: Vec<Workflow> = inner.values().cloned().collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        workflows
    }

    /// Apply a mutation to a workflow. Returns the updated record, or
    /// `None` if the id is unknown.
    pub async fn update<F>(&self, workflow_id: &str, mutate: F) -> Option<Workflow>
    where
        F: FnOnce(&mut Workflow),
    {
        let mut inner = self.inner.write().await;
        let workflow = inner.get_mut(workflow_id)?;
        mutate(workflow);
        Some(workflow.clone())
    }
}
