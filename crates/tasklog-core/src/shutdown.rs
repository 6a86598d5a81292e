//! Process-wide shutdown signal.
//!
//! The scheduler loops and the observer server all watch one [`Shutdown`].
//! Triggering it wakes every waiter; waiting after it has fired returns
//! immediately.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A one-shot, cloneable-by-`Arc` stop signal.
#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal and wake every waiter.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Wait until the signal fires.
    pub async fn wait(&self) {
        loop {
            // Registered before the flag check so a trigger in between is
            // not missed.
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
