//! Cooperative cancellation primitives.
//!
//! A [`CancelToken`] is threaded from the controller through the scheduler
//! and the agent handlers down to the executor. Every wait in the engine
//! selects between a timer and the token, so a cancelled workflow unwinds
//! its in-flight sleeps immediately. A provider call that has already been
//! dispatched is allowed to finish; only the next step is skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Clonable cancellation flag backed by a watch channel.
///
/// All clones observe the same flag; `cancel` is idempotent and can be
/// called from any clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the token is cancelled. Pending forever if it never is.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            // The sender lives inside every token clone, so `changed` can
            // only fail once all tokens are gone.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Sleep for `duration` unless the token fires first.
///
/// Returns `true` if the full duration elapsed, `false` if the wait was
/// interrupted by cancellation.
pub async fn sleep_cancellable(duration: Duration, token: &CancelToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = token.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancellation() {
        let token = CancelToken::new();
        assert!(sleep_cancellable(Duration::from_secs(5), &token).await);
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_interrupted_by_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            sleep_cancellable(Duration::from_secs(3600), &waiter).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        clone.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }
}
