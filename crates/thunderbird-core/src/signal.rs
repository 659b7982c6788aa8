//! Cooperative stop signalling for background tasks.
//!
//! A [`StopSignal`] is owned by whoever started a group of tasks; each
//! task holds a [`StopListener`]. Triggering is sticky and idempotent:
//! once triggered, every current and future listener observes it.

use tokio::sync::watch;

/// The owning side of a stop signal.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Ask every listener to stop. Calling this again is a no-op.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`trigger`](Self::trigger) has been called.
    #[cfg(test)]
    pub(crate) fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a listener for a task.
    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The task side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    /// Whether the owning signal has been triggered.
    ///
    /// A signal whose owner was dropped counts as triggered.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until the signal is triggered (or its owner is dropped).
    ///
    /// Cancel safe, so it can sit in a `tokio::select!` next to a timer.
    pub async fn stopped(&mut self) {
        // An error means the owner is gone, which also means stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
