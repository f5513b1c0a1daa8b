// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small helpers shared by the background networking tasks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Token for signaling cancellation of the background loops.
///
/// Teardown is coarse: one token is shared by the accept/connect loop and
/// the read/write loops of a connection, and cancelling it stops all of
/// them.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<tokio::sync::Notify>,
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Cancel the token, notifying all waiters
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.inner.notify_waiters();
    }

    /// Wait for cancellation
    pub async fn cancelled(&self) {
        let notified = self.inner.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after cancel")
            .expect("waiter task should not panic");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already-cancelled token must not block");
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
