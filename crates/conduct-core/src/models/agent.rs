use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived agent status: idle iff nothing is assigned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgentStatus {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "BUSY")]
    Busy,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Busy => "BUSY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(Self::Idle),
            "BUSY" => Some(Self::Busy),
            _ => None,
        }
    }
}

/// A named executor with a capability tag and bounded concurrent capacity.
///
/// The assigned-task list is mutated only by the scheduler loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Capability/role tag matched against a task's preferred role.
    pub role: String,
    /// Ids of tasks currently running on this agent.
    #[serde(default)]
    pub assigned_tasks: Vec<String>,
    pub max_concurrent: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: String, name: String, role: String, max_concurrent: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            role,
            assigned_tasks: Vec::new(),
            max_concurrent: max_concurrent.max(1),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> AgentStatus {
        if self.assigned_tasks.is_empty() {
            AgentStatus::Idle
        } else {
            AgentStatus::Busy
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.assigned_tasks.len() < self.max_concurrent
    }
}
