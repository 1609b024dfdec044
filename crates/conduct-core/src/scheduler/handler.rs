//! Task handler dispatch.
//!
//! A task's `kind` string resolves through the `HandlerRegistry`, which is
//! populated once at engine construction and validated there: duplicate
//! kinds are rejected at registration, and `create_workflow` rejects specs
//! whose kind has no handler. Handlers carry the domain logic the engine
//! itself stays agnostic of.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::{CallError, SchedulerError};
use crate::executor::ResilientExecutor;
use crate::models::task::Task;

/// Why a handler did not produce a result.
///
/// Executor failures convert losslessly: a cancelled call becomes a
/// cancelled task, everything else becomes failure text on the task
/// record. Nothing unwinds across this boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskFailure {
    #[error("{0}")]
    Failed(String),

    #[error("task cancelled")]
    Cancelled,
}

impl From<CallError> for TaskFailure {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Cancelled => Self::Cancelled,
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Everything a handler gets for one task execution.
#[derive(Clone)]
pub struct TaskContext {
    pub task: Task,
    /// Workflow-scoped cancellation token. Handlers must check it between
    /// steps and pass it to every executor call.
    pub cancel: CancelToken,
    pub executor: Arc<ResilientExecutor>,
}

/// Implemented by the domain layer for each task kind. Must be safe to
/// invoke concurrently for different tasks.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: TaskContext) -> Result<serde_json::Value, TaskFailure>;
}

/// Closed map from task kind to handler implementation.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a kind. Rejects duplicates so a kind can
    /// never silently change meaning.
    pub fn register(
        &mut self,
        kind: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), SchedulerError> {
        if self.handlers.contains_key(kind) {
            return Err(SchedulerError::InvalidSpec(format!(
                "handler kind '{kind}' is already registered"
            )));
        }
        self.handlers.insert(kind.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        async fn handle(&self, _ctx: TaskContext) -> Result<serde_json::Value, TaskFailure> {
            Ok(serde_json::Value::Null)
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = HandlerRegistry::new();
        registry.register("noop", Arc::new(NoopHandler)).unwrap();
        let err = registry.register("noop", Arc::new(NoopHandler)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSpec(_)));
        assert!(registry.contains("noop"));
        assert!(!registry.contains("other"));
    }

    #[test]
    fn call_error_converts_to_task_failure() {
        assert!(matches!(
            TaskFailure::from(CallError::Cancelled),
            TaskFailure::Cancelled
        ));
        let provider = crate::error::ProviderError {
            kind: crate::error::ErrorKind::Timeout,
            provider: "alpha".into(),
            message: "timed out".into(),
            attempts: 4,
        };
        match TaskFailure::from(CallError::Provider(provider)) {
            TaskFailure::Failed(msg) => assert!(msg.contains("timeout")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
