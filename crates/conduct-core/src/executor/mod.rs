//! Resilient provider execution.
//!
//! `ResilientExecutor` is the single "call this provider safely" primitive
//! every task handler goes through. It composes:
//!   - per-provider sliding-window rate limiting (plus minimum call spacing)
//!   - TTL response caching (a hit consumes no rate-limit budget)
//!   - bounded retry with exponential backoff, jitter, and an elevated
//!     floor for rate-limit/server errors
//!   - a two-provider fallback chain
//!   - cooperative cancellation at every wait point
//!
//! Failures come back as data (`CallError`), never as panics, so handlers
//! and the scheduler can branch on outcomes without unwinding.

pub mod cache;
pub mod rate_limiter;
pub mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;

use crate::cancel::{sleep_cancellable, CancelToken};
use crate::error::{CallError, ErrorKind, ProviderCallError, ProviderError};
use crate::events::{EngineEvent, EngineEventType, EventBus};

pub use cache::ResponseCache;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::BackoffPolicy;

pub type CallFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, ProviderCallError>> + Send>>;

/// Provider call contract: a zero-argument async callable returning a
/// value or a tagged failure. Providers must not retry or rate-limit
/// internally — that is the executor's responsibility.
pub trait ProviderCall: Send + Sync {
    fn call(&self) -> CallFuture;
}

impl<F, Fut> ProviderCall for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ProviderCallError>> + Send + 'static,
{
    fn call(&self) -> CallFuture {
        Box::pin((self)())
    }
}

/// One executor invocation: what to call, where, and with which arguments
/// (the arguments only feed the cache key — the thunk itself is already
/// bound).
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub call_name: String,
    pub provider: String,
    pub args: serde_json::Value,
    pub use_cache: bool,
}

impl CallRequest {
    pub fn new(call_name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            call_name: call_name.into(),
            provider: provider.into(),
            args: serde_json::Value::Null,
            use_cache: true,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = args;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Per-provider execution tuning.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub backoff: BackoffPolicy,
    pub rate_limit: RateLimitConfig,
}

/// Executor-wide configuration: defaults plus per-provider overrides.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub default_provider: ProviderConfig,
    pub providers: HashMap<String, ProviderConfig>,
    pub cache_ttl: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderConfig::default(),
            providers: HashMap::new(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Bookkeeping for a single attempt within one `execute` invocation.
/// Discarded once the call resolves.
struct CallAttempt {
    attempt: u32,
    started: Instant,
    kind: ErrorKind,
    next_delay: Option<Duration>,
}

impl CallAttempt {
    fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "attempt": self.attempt,
            "elapsedMs": self.started.elapsed().as_millis() as u64,
            "errorKind": self.kind.as_str(),
            "nextDelayMs": self.next_delay.map(|d| d.as_millis() as u64),
        })
    }
}

pub struct ResilientExecutor {
    rate_limiter: RateLimiter,
    cache: ResponseCache,
    default_policy: BackoffPolicy,
    policies: HashMap<String, BackoffPolicy>,
    events: EventBus,
}

impl ResilientExecutor {
    pub fn new(config: ExecutorConfig, events: EventBus) -> Self {
        let mut rate_limiter = RateLimiter::new(config.default_provider.rate_limit.clone());
        let mut policies = HashMap::new();
        for (provider, provider_config) in &config.providers {
            rate_limiter = rate_limiter.with_provider(provider, provider_config.rate_limit.clone());
            policies.insert(provider.clone(), provider_config.backoff.clone());
        }
        Self {
            rate_limiter,
            cache: ResponseCache::new(config.cache_ttl),
            default_policy: config.default_provider.backoff,
            policies,
            events,
        }
    }

    fn policy_for(&self, provider: &str) -> &BackoffPolicy {
        self.policies.get(provider).unwrap_or(&self.default_policy)
    }

    /// Execute one provider call under the full resilience stack.
    pub async fn execute(
        &self,
        req: &CallRequest,
        call: &dyn ProviderCall,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value, CallError> {
        let cache_key = ResponseCache::key(&req.call_name, &req.args);
        if req.use_cache {
            if let Some(hit) = self.cache.get(&cache_key).await {
                self.emit(
                    EngineEvent::new(EngineEventType::CacheHit, &req.call_name)
                        .with_provider(&req.provider),
                )
                .await;
                return Ok(hit);
            }
        }

        let policy = self.policy_for(&req.provider).clone();
        let max_attempts = policy.max_retries + 1;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(req, attempt).await;
            }
            if !self
                .rate_limiter
                .wait_until_admitted(&req.provider, cancel)
                .await
            {
                return self.cancelled(req, attempt).await;
            }

            self.emit(
                EngineEvent::new(EngineEventType::CallStarting, &req.call_name)
                    .with_provider(&req.provider)
                    .with_attempt(attempt),
            )
            .await;

            let started = Instant::now();
            match call.call().await {
                Ok(value) => {
                    self.emit(
                        EngineEvent::new(EngineEventType::CallSucceeded, &req.call_name)
                            .with_provider(&req.provider)
                            .with_attempt(attempt)
                            .with_duration_ms(started.elapsed().as_millis() as u64),
                    )
                    .await;
                    if req.use_cache {
                        self.cache.put(cache_key, value.clone()).await;
                    }
                    return Ok(value);
                }
                Err(raw) => {
                    let kind = retry::classify(&raw);
                    if kind.is_retryable() && attempt + 1 < max_attempts {
                        let delay = retry::backoff_delay(kind, attempt, &policy);
                        let record = CallAttempt {
                            attempt,
                            started,
                            kind,
                            next_delay: Some(delay),
                        };
                        tracing::warn!(
                            "[Executor] {} on {} ({}), retrying in {:?} (attempt {}/{})",
                            kind.as_str(),
                            req.provider,
                            raw.message,
                            delay,
                            attempt + 1,
                            max_attempts,
                        );
                        self.emit(
                            EngineEvent::new(EngineEventType::RetryPending, &req.call_name)
                                .with_provider(&req.provider)
                                .with_attempt(attempt)
                                .with_data(record.as_json()),
                        )
                        .await;
                        let delay = retry::apply_jitter(delay, &mut rand::thread_rng());
                        if !sleep_cancellable(delay, cancel).await {
                            return self.cancelled(req, attempt).await;
                        }
                        attempt += 1;
                        continue;
                    }

                    let error = ProviderError {
                        kind,
                        provider: req.provider.clone(),
                        message: raw.message,
                        attempts: attempt + 1,
                    };
                    tracing::warn!("[Executor] {} failed: {}", req.call_name, error);
                    self.emit(
                        EngineEvent::new(EngineEventType::CallFailed, &req.call_name)
                            .with_provider(&req.provider)
                            .with_attempt(attempt)
                            .with_duration_ms(started.elapsed().as_millis() as u64)
                            .with_data(serde_json::json!({ "errorKind": kind.as_str() })),
                    )
                    .await;
                    return Err(CallError::Provider(error));
                }
            }
        }
    }

    /// Run the primary call under the full policy; if it fails, run the
    /// fallback the same way. Both failing yields a composite error with
    /// both reasons — callers branch on the error, nothing is raised.
    pub async fn execute_with_fallback(
        &self,
        primary: &CallRequest,
        primary_call: &dyn ProviderCall,
        fallback: &CallRequest,
        fallback_call: &dyn ProviderCall,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value, CallError> {
        let primary_error = match self.execute(primary, primary_call, cancel).await {
            Ok(value) => return Ok(value),
            Err(CallError::Cancelled) => return Err(CallError::Cancelled),
            Err(CallError::Provider(error)) => error,
            Err(other) => return Err(other),
        };

        tracing::info!(
            "[Executor] primary provider {} exhausted ({}), falling back to {}",
            primary.provider,
            primary_error,
            fallback.provider,
        );

        match self.execute(fallback, fallback_call, cancel).await {
            Ok(value) => Ok(value),
            Err(CallError::Cancelled) => Err(CallError::Cancelled),
            Err(CallError::Provider(fallback_error)) => Err(CallError::BothFailed {
                primary: primary_error,
                fallback: fallback_error,
            }),
            Err(other) => Err(other),
        }
    }

    async fn cancelled(
        &self,
        req: &CallRequest,
        attempt: u32,
    ) -> Result<serde_json::Value, CallError> {
        self.emit(
            EngineEvent::new(EngineEventType::CallCancelled, &req.call_name)
                .with_provider(&req.provider)
                .with_attempt(attempt),
        )
        .await;
        Err(CallError::Cancelled)
    }

    async fn emit(&self, event: EngineEvent) {
        self.events.emit(event).await;
    }
}
