//! Conduct Core - dependency-aware task scheduling with resilient
//! provider execution.
//!
//! The crate coordinates a pool of agents executing interdependent tasks
//! organized into workflows, where tasks reach unreliable external
//! providers through a single resilient primitive. It is
//! transport-agnostic: no HTTP surface, no persistence - suitable for
//! embedding in servers, CLIs, or tests.
//!
//! Two halves:
//!
//! - **Work graph + scheduler** - `Task`/`Agent`/`Workflow` records,
//!   dependency-based readiness, concurrency-bounded assignment, and a
//!   single loop owning every state transition.
//! - **Resilient executor** - per-provider rate limiting, TTL response
//!   caching, classified retry with backoff and jitter, provider
//!   fallback, and cooperative cancellation.
//!
//! Entry point: build a [`scheduler::handler::HandlerRegistry`], call
//! [`state::Engine::start`], and drive workflows through the
//! [`controller::WorkflowController`].

pub mod cancel;
pub mod controller;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod scheduler;
pub mod schema;
pub mod state;
pub mod store;

// Convenience re-exports
pub use cancel::CancelToken;
pub use controller::WorkflowController;
pub use error::{CallError, ErrorKind, ProviderCallError, ProviderError, SchedulerError};
pub use events::{EngineEvent, EngineEventType, EventBus};
pub use executor::{CallRequest, ExecutorConfig, ProviderCall, ResilientExecutor};
pub use scheduler::handler::{HandlerRegistry, TaskContext, TaskFailure, TaskHandler};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use schema::{AgentSpec, TaskSpec, WorkflowDefinition};
pub use state::{Engine, EngineConfig, EngineState};
