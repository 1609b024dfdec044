//! In-memory registries for the work graph.
//!
//! Persistence is out of scope for this engine, so the stores are
//! `Arc<RwLock<HashMap>>` maps. Task and Agent records are mutated only
//! from the scheduler loop; the controller reads them for status
//! reporting.

mod agent_store;
mod task_store;
mod workflow_store;

pub use agent_store::AgentStore;
pub use task_store::TaskStore;
pub use workflow_store::WorkflowStore;
