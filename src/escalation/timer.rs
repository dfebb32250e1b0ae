//! Deferred, cancellable timers
//!
//! A timer is a spawned task plus a token. The callback re-checks its token
//! against the offender's pending slot under the engine lock, so a cancel
//! and a fire can never both take effect.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub u64);

#[derive(Debug)]
pub struct PendingTimer {
    token: TimerToken,
    handle: JoinHandle<()>,
}

impl PendingTimer {
    /// Spawn `on_fire` after `delay` on the current runtime
    pub fn spawn<F>(token: TimerToken, delay: Duration, on_fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        debug!(token = token.0, delay_secs = delay.as_secs(), "Armed deferred timer");
        Self { token, handle }
    }

    pub fn token(&self) -> TimerToken {
        self.token
    }

    /// Abort the task. Safe if it already finished.
    pub fn cancel(self) {
        debug!(token = self.token.0, "Cancelled deferred timer");
        self.handle.abort();
    }
}
