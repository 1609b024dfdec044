use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    /// Legal hold state reserved for manual intervention; no engine code
    /// path enters it.
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "PAUSED" => Some(Self::Paused),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One unit of schedulable work with declared dependencies.
///
/// Task records are owned and mutated exclusively by the scheduler loop;
/// everything else only reads them through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Handler kind, resolved through the `HandlerRegistry`.
    pub kind: String,
    /// Ordering hint within the ready queue; higher runs first. Not
    /// correctness-critical and never preempts a running task.
    pub priority: i32,
    pub status: TaskStatus,
    /// Ids of tasks that must complete before this one becomes ready.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form parameters, interpreted only by the handler.
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 0-100; forced to 100 on completion.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    pub workflow_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        name: String,
        kind: String,
        workflow_id: String,
        dependencies: Vec<String>,
        params: serde_json::Value,
        priority: i32,
        preferred_role: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            kind,
            priority,
            status: TaskStatus::Pending,
            dependencies,
            params,
            result: None,
            error: None,
            progress: 0,
            preferred_role,
            assigned_agent: None,
            workflow_id,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Wall-clock duration, available once the task has started and finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}
