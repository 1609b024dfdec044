//! Event Bus - status notification sink for scheduler and executor events.
//!
//! The engine emits one event per state transition (task and workflow
//! lifecycle changes, provider call attempts, cache hits). Delivery is
//! fire-and-forget: handlers run in their own tasks, so a slow or absent
//! sink never blocks the scheduler loop or an executor retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Event types emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEventType {
    // Provider call lifecycle (executor)
    CallStarting,
    RetryPending,
    CallSucceeded,
    CallFailed,
    CallCancelled,
    CacheHit,
    // Task lifecycle (scheduler)
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    // Workflow lifecycle (scheduler)
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
}

impl EngineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallStarting => "CALL_STARTING",
            Self::RetryPending => "RETRY_PENDING",
            Self::CallSucceeded => "CALL_SUCCEEDED",
            Self::CallFailed => "CALL_FAILED",
            Self::CallCancelled => "CALL_CANCELLED",
            Self::CacheHit => "CACHE_HIT",
            Self::TaskStarted => "TASK_STARTED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskFailed => "TASK_FAILED",
            Self::TaskCancelled => "TASK_CANCELLED",
            Self::WorkflowStarted => "WORKFLOW_STARTED",
            Self::WorkflowCompleted => "WORKFLOW_COMPLETED",
            Self::WorkflowFailed => "WORKFLOW_FAILED",
            Self::WorkflowCancelled => "WORKFLOW_CANCELLED",
        }
    }
}

/// An event describing one engine state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub event_type: EngineEventType,
    /// What the event is about: a call name, task id, or workflow id.
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(event_type: EngineEventType, subject: impl Into<String>) -> Self {
        Self {
            event_type,
            subject: subject.into(),
            provider: None,
            attempt: None,
            duration_ms: None,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

type EventHandler = Arc<dyn Fn(EngineEvent) + Send + Sync>;

struct EventBusInner {
    handlers: HashMap<String, EventHandler>,
}

/// Thread-safe event bus shared by the scheduler and the executor.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<RwLock<EventBusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(EventBusInner {
                handlers: HashMap::new(),
            })),
        }
    }

    /// Subscribe to events with a handler function.
    pub async fn on<F>(&self, key: &str, handler: F)
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().await;
        inner.handlers.insert(key.to_string(), Arc::new(handler));
    }

    /// Unsubscribe a handler.
    pub async fn off(&self, key: &str) {
        let mut inner = self.inner.write().await;
        inner.handlers.remove(key);
    }

    /// Publish an event to all handlers. Fire and forget - each handler
    /// runs in its own task and cannot block the emitter.
    pub async fn emit(&self, event: EngineEvent) {
        let inner = self.inner.read().await;
        for handler in inner.handlers.values() {
            let handler = handler.clone();
            let event = event.clone();
            tokio::spawn(async move {
                handler(event);
            });
        }
    }
}
