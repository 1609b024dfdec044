use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::task::{Task, TaskStatus};
use crate::models::workflow::TaskCounts;

#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, task: &Task) {
        let mut inner = self.inner.write().await;
        inner.insert(task.id.clone(), task.clone());
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        let inner = self.inner.read().await;
        inner.get(task_id).cloned()
    }

    pub async fn list_by_workflow(&self, workflow_id: &str) -> Vec<Task> {
        let inner = self.inner.read().await;
        inner
            .values()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    /// Apply a mutation to a task and bump its `updated_at`.
    /// Returns the updated record, or `None` if the id is unknown.
    pub async fn update<F>(&self, task_id: &str, mutate: F) -> Option<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut inner = self.inner.write().await;
        let task = inner.get_mut(task_id)?;
        mutate(task);
        task.updated_at = Utc::now();
        Some(task.clone())
    }

    pub async fn update_status(&self, task_id: &str, status: TaskStatus) -> Option<Task> {
        self.update(task_id, |t| t.status = status).await
    }

    /// Readiness scan: among `ordered_ids`, the tasks that are `pending`
    /// with every dependency `completed`, preserving the given order
    /// (discovery order). O(tasks) per call, which is fine at the tens of
    /// tasks this engine schedules.
    pub async fn find_ready_tasks(&self, ordered_ids: &[String]) -> Vec<Task> {
        let inner = self.inner.read().await;
        let completed_ids: HashSet<&str> = ordered_ids
            .iter()
            .filter_map(|id| inner.get(id.as_str()))
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.as_str())
            .collect();

        ordered_ids
            .iter()
            .filter_map(|id| inner.get(id.as_str()))
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.dependencies
                        .iter()
                        .all(|dep| completed_ids.contains(dep.as_str()))
            })
            .cloned()
            .collect()
    }

    /// Status tallies for a set of task ids. The sum always equals the
    /// number of known ids, so snapshots stay consistent mid-flight.
    pub async fn counts_by_status(&self, ids: &[String]) -> TaskCounts {
        let inner = self.inner.read().await;
        let mut counts = TaskCounts::default();
        for id in ids {
            let Some(task) = inner.get(id.as_str()) else {
                continue;
            };
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Paused => counts.paused += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}
