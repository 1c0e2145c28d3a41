use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Gate that opens once the hub has been confirmed responsive.
///
/// Closed again on every hub reset. Timesync waits on it before sending.
#[derive(Debug, Default)]
pub struct DiscoveryGate {
    complete: Mutex<bool>,
    cond: Condvar,
}

impl DiscoveryGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_complete(&self) {
        *self.complete.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.complete.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_complete(&self) -> bool {
        *self.complete.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block up to `timeout` for the gate to open. Returns whether it did.
    pub fn wait_complete(&self, timeout: Duration) -> bool {
        let guard = self.complete.lock().unwrap_or_else(PoisonError::into_inner);
        let (complete, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |complete| !*complete)
            .unwrap_or_else(PoisonError::into_inner);
        *complete
    }
}
