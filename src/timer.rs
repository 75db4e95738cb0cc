//! Cancellable timers
//!
//! Deferred work that can be rescheduled or cancelled before it fires. Used
//! for overlay expiry and for coalescing bursts of page changes into a
//! single refresh.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A single pending deferred task. Scheduling again replaces the pending
/// task; dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct CancellableTimer {
    handle: Option<JoinHandle<()>>,
}

impl CancellableTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Run `task` after `delay`, cancelling whatever was pending.
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CancellableTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Trailing-edge debouncer: only the last call within `window` runs.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    timer: CancellableTimer,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timer: CancellableTimer::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn call<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.timer.schedule(self.window, task);
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }
}
