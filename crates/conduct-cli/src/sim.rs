//! Simulated flaky providers for exercising the engine from the CLI.
//!
//! The `simulate` task kind drives every resilience path of the executor
//! without any real network: a task's params describe how its provider
//! misbehaves (how many calls fail before one succeeds, with which error,
//! whether a fallback provider exists), and the handler routes the call
//! through the shared `ResilientExecutor` exactly like a production
//! handler would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use conduct_core::error::ProviderCallError;
use conduct_core::executor::{CallFuture, CallRequest};
use conduct_core::scheduler::handler::{TaskContext, TaskFailure, TaskHandler};

/// Provider behavior, read from the task's param bag.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Call name for rate limiting, caching, and events; defaults to the
    /// task name.
    pub call: Option<String>,
    pub provider: String,
    /// Optional secondary provider; always healthy in the simulation.
    pub fallback: Option<String>,
    /// The provider fails this many calls before succeeding.
    pub fail_times: u64,
    /// Failure message used for classification (e.g. "rate limit
    /// exceeded", "connection refused").
    pub error: String,
    /// HTTP-style status attached to failures, if any.
    pub status: Option<u16>,
    /// Simulated provider latency per call.
    pub work_ms: u64,
    /// Value returned on success.
    pub payload: serde_json::Value,
    pub use_cache: bool,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            call: None,
            provider: "primary".to_string(),
            fallback: None,
            fail_times: 0,
            error: "server error".to_string(),
            status: None,
            work_ms: 25,
            payload: serde_json::Value::Null,
            use_cache: true,
        }
    }
}

/// Handler for the `simulate` task kind.
#[derive(Default)]
pub struct SimulateHandler;

impl SimulateHandler {
    pub fn new() -> Self {
        Self
    }
}

fn flaky_call(
    remaining_failures: Arc<AtomicU64>,
    params: &SimParams,
) -> impl Fn() -> CallFuture + Send + Sync {
    let error = params.error.clone();
    let status = params.status;
    let payload = success_payload(params);
    let work = Duration::from_millis(params.work_ms);
    move || {
        let remaining_failures = remaining_failures.clone();
        let error = error.clone();
        let payload = payload.clone();
        Box::pin(async move {
            tokio::time::sleep(work).await;
            if remaining_failures.load(Ordering::SeqCst) > 0 {
                remaining_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(match status {
                    Some(code) => ProviderCallError::with_status(error, code),
                    None => ProviderCallError::new(error),
                });
            }
            Ok(payload)
        })
    }
}

fn success_payload(params: &SimParams) -> serde_json::Value {
    if params.payload.is_null() {
        json!({ "ok": true })
    } else {
        params.payload.clone()
    }
}

#[async_trait]
impl TaskHandler for SimulateHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<serde_json::Value, TaskFailure> {
        let params = if ctx.task.params.is_null() {
            SimParams::default()
        } else {
            serde_json::from_value(ctx.task.params.clone())
                .map_err(|e| TaskFailure::Failed(format!("invalid simulate params: {e}")))?
        };

        let call_name = params
            .call
            .clone()
            .unwrap_or_else(|| ctx.task.name.clone());
        tracing::debug!(
            "[Sim] task '{}' calling {} via provider {} (fail_times: {})",
            ctx.task.name,
            call_name,
            params.provider,
            params.fail_times
        );
        let mut request = CallRequest::new(&call_name, &params.provider)
            .with_args(success_payload(&params));
        if !params.use_cache {
            request = request.without_cache();
        }

        let primary = flaky_call(Arc::new(AtomicU64::new(params.fail_times)), &params);

        let value = match &params.fallback {
            Some(fallback_provider) => {
                let mut fallback_request = CallRequest::new(&call_name, fallback_provider)
                    .with_args(success_payload(&params));
                if !params.use_cache {
                    fallback_request = fallback_request.without_cache();
                }
                let fallback = flaky_call(Arc::new(AtomicU64::new(0)), &params);
                ctx.executor
                    .execute_with_fallback(
                        &request,
                        &primary,
                        &fallback_request,
                        &fallback,
                        &ctx.cancel,
                    )
                    .await?
            }
            None => ctx.executor.execute(&request, &primary, &ctx.cancel).await?,
        };

        Ok(json!({ "call": call_name, "value": value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_when_missing() {
        let params: SimParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.provider, "primary");
        assert_eq!(params.fail_times, 0);
        assert!(params.use_cache);
    }

    #[test]
    fn params_parse_overrides() {
        let params: SimParams = serde_json::from_value(json!({
            "provider": "alpha",
            "fallback": "beta",
            "fail_times": 2,
            "error": "rate limit exceeded",
            "work_ms": 5,
            "use_cache": false,
        }))
        .unwrap();
        assert_eq!(params.provider, "alpha");
        assert_eq!(params.fallback.as_deref(), Some("beta"));
        assert_eq!(params.fail_times, 2);
        assert!(!params.use_cache);
    }
}
