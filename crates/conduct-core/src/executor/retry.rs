//! Failure classification and backoff policy.
//!
//! The policy side is pure: `classify` maps a raw provider failure onto
//! the closed [`ErrorKind`] taxonomy, and `backoff_delay` computes the
//! un-jittered delay before the next attempt. Jitter is applied separately
//! at the call site so the core math stays unit-testable.

use std::time::Duration;

use rand::Rng;

use crate::error::{ErrorKind, ProviderCallError};

/// Per-provider retry/backoff tuning.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retries after the initial attempt (so `max_retries + 1` attempts total).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Floor applied to rate-limit and server errors, which tend to need
    /// longer cool-downs than the exponential curve gives early on.
    pub elevated_floor: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            elevated_floor: Duration::from_secs(5),
        }
    }
}

/// Map a raw provider failure onto the closed error taxonomy.
///
/// An HTTP-style status wins when present; otherwise keyword matching on
/// the message decides. Unrecognized failures classify as `unknown`,
/// which is not retryable.
pub fn classify(err: &ProviderCallError) -> ErrorKind {
    if let Some(status) = err.status {
        return match status {
            429 => ErrorKind::RateLimited,
            401 | 403 => ErrorKind::AuthError,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        };
    }

    let msg = err.message.to_lowercase();
    if msg.contains("rate limit") || msg.contains("rate_limited") || msg.contains("too many requests")
    {
        ErrorKind::RateLimited
    } else if msg.contains("unauthorized")
        || msg.contains("forbidden")
        || msg.contains("api key")
        || msg.contains("auth")
    {
        ErrorKind::AuthError
    } else if msg.contains("timeout") || msg.contains("timed out") {
        ErrorKind::Timeout
    } else if msg.contains("connection")
        || msg.contains("network")
        || msg.contains("dns")
        || msg.contains("refused")
    {
        ErrorKind::Network
    } else if msg.contains("not found") || msg.contains("not_found") || msg.contains("no such") {
        ErrorKind::NotFound
    } else if msg.contains("server error")
        || msg.contains("server_error")
        || msg.contains("internal")
        || msg.contains("unavailable")
        || msg.contains("overloaded")
    {
        ErrorKind::ServerError
    } else {
        ErrorKind::Unknown
    }
}

/// Un-jittered delay before the next attempt: `base * 2^attempt`, clamped
/// to `max_delay`. `attempt` is zero-based.
pub fn backoff_delay(kind: ErrorKind, attempt: u32, policy: &BackoffPolicy) -> Duration {
    let factor = 1u32 << attempt.min(20);
    let delay = policy.base_delay.saturating_mul(factor).min(policy.max_delay);
    match kind {
        ErrorKind::RateLimited | ErrorKind::ServerError => delay.max(policy.elevated_floor),
        _ => delay,
    }
}

/// Random jitter factor in [0.5, 1.5) applied to a computed delay, so
/// concurrent callers backing off from the same provider do not re-arrive
/// in lockstep.
pub fn apply_jitter(delay: Duration, rng: &mut impl Rng) -> Duration {
    let factor: f64 = rng.gen_range(0.5..1.5);
    delay.mul_f64(factor)
}
