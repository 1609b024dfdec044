//! Per-provider sliding-window admission control.
//!
//! Each provider keeps its own window state behind its own mutex, so two
//! executor calls against unrelated providers never contend. The outer map
//! lock is held only long enough to look up or create a provider entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::cancel::{sleep_cancellable, CancelToken};

/// Wake a touch after the oldest call actually leaves the window, so a
/// re-check does not land a hair early and spin.
const WAIT_BUFFER: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum calls admitted within the rolling window.
    pub max_calls: usize,
    pub window: Duration,
    /// Fixed minimum spacing between consecutive calls to one provider,
    /// smoothing bursts that the window alone would admit.
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            window: Duration::from_secs(60),
            min_interval: Duration::from_millis(100),
        }
    }
}

struct ProviderWindow {
    config: RateLimitConfig,
    calls: VecDeque<Instant>,
    last_call: Option<Instant>,
}

impl ProviderWindow {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            calls: VecDeque::new(),
            last_call: None,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.calls.front() {
            if now.duration_since(*front) >= self.config.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until the next call may proceed; zero when admissible now.
    fn wait_needed(&mut self, now: Instant) -> Duration {
        self.prune(now);
        let mut wait = Duration::ZERO;
        if self.calls.len() >= self.config.max_calls {
            if let Some(oldest) = self.calls.front() {
                wait = (*oldest + self.config.window).saturating_duration_since(now);
            }
        }
        if let Some(last) = self.last_call {
            wait = wait.max((last + self.config.min_interval).saturating_duration_since(now));
        }
        wait
    }

    fn record(&mut self, now: Instant) {
        self.calls.push_back(now);
        self.last_call = Some(now);
    }
}

pub struct RateLimiter {
    default_config: RateLimitConfig,
    configs: HashMap<String, RateLimitConfig>,
    providers: RwLock<HashMap<String, Arc<Mutex<ProviderWindow>>>>,
}

impl RateLimiter {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            configs: HashMap::new(),
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Override the window configuration for one provider. Builder-style,
    /// call before the limiter is shared.
    pub fn with_provider(mut self, provider: &str, config: RateLimitConfig) -> Self {
        self.configs.insert(provider.to_string(), config);
        self
    }

    async fn window_for(&self, provider: &str) -> Arc<Mutex<ProviderWindow>> {
        {
            let providers = self.providers.read().await;
            if let Some(window) = providers.get(provider) {
                return window.clone();
            }
        }
        let mut providers = self.providers.write().await;
        providers
            .entry(provider.to_string())
            .or_insert_with(|| {
                let config = self
                    .configs
                    .get(provider)
                    .cloned()
                    .unwrap_or_else(|| self.default_config.clone());
                Arc::new(Mutex::new(ProviderWindow::new(config)))
            })
            .clone()
    }

    /// Non-blocking probe: records and admits the call if the window has
    /// room right now.
    pub async fn try_admit(&self, provider: &str) -> bool {
        let window = self.window_for(provider).await;
        let mut window = window.lock().await;
        let now = Instant::now();
        if window.wait_needed(now).is_zero() {
            window.record(now);
            true
        } else {
            false
        }
    }

    /// Block cooperatively until the window admits a call, then record it.
    /// Returns `false` if the cancellation token fired first.
    pub async fn wait_until_admitted(&self, provider: &str, cancel: &CancelToken) -> bool {
        let window = self.window_for(provider).await;
        loop {
            let wait = {
                let mut window = window.lock().await;
                let now = Instant::now();
                let wait = window.wait_needed(now);
                if wait.is_zero() {
                    window.record(now);
                    return true;
                }
                wait
            };
            if !sleep_cancellable(wait + WAIT_BUFFER, cancel).await {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_calls: usize, window_secs: u64, min_interval_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_calls,
            window: Duration::from_secs(window_secs),
            min_interval: Duration::from_millis(min_interval_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn admits_until_window_is_full() {
        let limiter = limiter(3, 60, 0);
        assert!(limiter.try_admit("alpha").await);
        assert!(limiter.try_admit("alpha").await);
        assert!(limiter.try_admit("alpha").await);
        assert!(!limiter.try_admit("alpha").await);
        // Unrelated provider has its own window.
        assert!(limiter.try_admit("beta").await);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_oldest_call_expires() {
        let limiter = limiter(2, 10, 0);
        let cancel = CancelToken::new();
        assert!(limiter.wait_until_admitted("alpha", &cancel).await);
        assert!(limiter.wait_until_admitted("alpha", &cancel).await);

        let start = Instant::now();
        assert!(limiter.wait_until_admitted("alpha", &cancel).await);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(10));
        assert!(waited < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_spaces_consecutive_calls() {
        let limiter = limiter(100, 60, 500);
        let cancel = CancelToken::new();
        assert!(limiter.wait_until_admitted("alpha", &cancel).await);
        let start = Instant::now();
        assert!(limiter.wait_until_admitted("alpha", &cancel).await);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_aborts_on_cancellation() {
        let limiter = Arc::new(limiter(1, 3600, 0));
        let cancel = CancelToken::new();
        assert!(limiter.wait_until_admitted("alpha", &cancel).await);

        let waiter_limiter = limiter.clone();
        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            waiter_limiter
                .wait_until_admitted("alpha", &waiter_cancel)
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        assert!(!handle.await.unwrap());
    }
}
