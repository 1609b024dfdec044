//! Core error types for the Conduct engine.
//!
//! `SchedulerError` is returned synchronously from the `WorkflowController`
//! surface. Provider failures are carried as data (`CallError`) through the
//! executor and the handler boundary — they never unwind the call stack.

use serde::{Deserialize, Serialize};

/// Scheduler-level error, returned directly to the controller caller.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Classified provider failure kinds.
///
/// Retryable kinds (`rate_limited`, `server_error`, `network`, `timeout`)
/// trigger another attempt while the retry budget lasts; the rest fail the
/// call immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    AuthError,
    NotFound,
    ServerError,
    Network,
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthError => "auth_error",
            Self::NotFound => "not_found",
            Self::ServerError => "server_error",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Network | Self::Timeout
        )
    }
}

/// Raw failure surfaced by a provider call, before classification.
///
/// Providers report failures in-band through this type (tagged result, not
/// an `{error: ...}` payload); the executor classifies it into an
/// [`ErrorKind`] using the status code when present, message keywords
/// otherwise.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderCallError {
    pub message: String,
    /// HTTP-style status code, when the provider exposes one.
    pub status: Option<u16>,
}

impl ProviderCallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// A provider failure after classification and retry exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{provider}: {} ({message}) after {attempts} attempt(s)", .kind.as_str())]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub provider: String,
    pub message: String,
    /// How many attempts were made before giving up.
    pub attempts: u32,
}

/// Failed outcome of a `ResilientExecutor` invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Provider(ProviderError),

    /// The cancellation token fired during a wait. Distinguished from the
    /// underlying provider error so callers can unwind cleanly.
    #[error("call cancelled")]
    Cancelled,

    /// Both the primary and the fallback provider failed; carries both
    /// typed failures so callers can branch without string matching.
    #[error("primary and fallback failed: {primary}; {fallback}")]
    BothFailed {
        primary: ProviderError,
        fallback: ProviderError,
    },
}

impl CallError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
