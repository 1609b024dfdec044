//! YAML schema types for workflow definitions.
//!
//! A workflow YAML declares the agent pool and the task graph:
//!
//! ```yaml
//! name: "Nightly Market Sync"
//! description: "Refresh quotes, then compute indicators"
//!
//! agents:
//!   - name: fetcher-1
//!     role: fetcher
//!     max_concurrent: 2
//!   - name: analyst-1
//!     role: analyst
//!
//! tasks:
//!   - name: fetch-quotes
//!     kind: simulate
//!     preferred_role: fetcher
//!     params:
//!       provider: alpha
//!
//!   - name: compute-indicators
//!     kind: simulate
//!     preferred_role: analyst
//!     depends_on: [fetch-quotes]
//!     priority: 5
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Top-level workflow definition loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Owner reference (free-form)
    #[serde(default)]
    pub owner: Option<String>,

    /// Agent pool to register before the workflow starts
    #[serde(default)]
    pub agents: Vec<AgentSpec>,

    /// Task graph, in declaration order
    pub tasks: Vec<TaskSpec>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Declares one agent of the execution pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,

    /// Capability/role tag matched against `TaskSpec::preferred_role`
    #[serde(default = "default_role")]
    pub role: String,

    /// Upper bound on simultaneously assigned tasks
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_role() -> String {
    "general".to_string()
}

fn default_max_concurrent() -> usize {
    1
}

/// Declares one task of the work graph.
///
/// `depends_on` entries reference other tasks by their spec-local id
/// (`id` when given, otherwise `name`). The engine assigns globally
/// unique ids at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Spec-local id; defaults to `name`
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    /// Handler kind — must be registered in the `HandlerRegistry`
    pub kind: String,

    /// Spec-local ids of prerequisite tasks
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Ordering hint; higher runs first within the ready queue
    #[serde(default)]
    pub priority: i32,

    /// Preferred agent role tag
    #[serde(default)]
    pub preferred_role: Option<String>,

    /// Free-form parameters handed to the handler
    #[serde(default)]
    pub params: serde_json::Value,
}

impl TaskSpec {
    /// The id other specs use to reference this task.
    pub fn local_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

impl WorkflowDefinition {
    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchedulerError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SchedulerError::InvalidSpec(format!("failed to parse workflow YAML: {e}")))
    }

    /// Load a workflow definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::InvalidSpec(format!("failed to read workflow file '{path}': {e}"))
        })?;
        Self::from_yaml(&content)
    }
}
