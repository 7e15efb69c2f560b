//! Trailing-edge debouncing of viewport changes

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs only the last of a burst of scheduled actions
///
/// Every [`Debouncer::schedule`] call cancels the pending action, if any, and arms a
/// new timer. The action runs once the delay elapses without another call. Must be
/// used from within a tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` after the quiet delay, replacing any pending action
    pub fn schedule<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Drop the pending action without running it
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Whether an action is armed and has not finished yet
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
