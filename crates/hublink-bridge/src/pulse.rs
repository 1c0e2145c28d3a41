use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Command carried by a pulse probe and echoed by its acknowledgement.
pub const PULSE_PROBE: u16 = 0x0001;

/// Liveness state shared by probe senders and the StateMonitor.
///
/// Only a probe sender clears `back_online` (in [`arm`](Self::arm), before the
/// probe goes out), and only the StateMonitor sets it. Completion wakes every
/// waiter.
#[derive(Debug, Default)]
pub struct PulseHandshake {
    state: Mutex<LivenessState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct LivenessState {
    back_online: bool,
    next_transaction: u8,
    /// Transaction of the most recent probe; older acks are stale.
    outstanding: Option<u8>,
}

impl PulseHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LivenessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the online flag and allocate the transaction for a new probe.
    ///
    /// Must be called before the probe is sent.
    pub(crate) fn arm(&self) -> u8 {
        let mut state = self.lock();
        state.back_online = false;
        let transaction = state.next_transaction;
        state.next_transaction = state.next_transaction.wrapping_add(1);
        state.outstanding = Some(transaction);
        transaction
    }

    /// Record an acknowledgement. Returns `false` for a stale ack.
    pub(crate) fn notify_back_online(&self, transaction: u8) -> bool {
        let mut state = self.lock();
        if state.outstanding != Some(transaction) {
            return false;
        }
        state.back_online = true;
        drop(state);
        self.cond.notify_all();
        true
    }

    pub fn is_back_online(&self) -> bool {
        self.lock().back_online
    }

    /// Block up to `timeout` for the hub to be confirmed online, without
    /// sending a probe of our own.
    pub fn wait_online(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (state, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |s| !s.back_online)
            .unwrap_or_else(PoisonError::into_inner);
        state.back_online
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn arm_clears_a_stale_online_flag() {
        let pulse = PulseHandshake::new();
        let first = pulse.arm();
        assert!(pulse.notify_back_online(first));
        assert!(pulse.is_back_online());

        pulse.arm();
        assert!(!pulse.is_back_online());
        assert!(!pulse.wait_online(Duration::from_millis(10)));
    }

    #[test]
    fn ack_for_an_older_probe_is_ignored() {
        let pulse = PulseHandshake::new();
        let old = pulse.arm();
        let current = pulse.arm();
        assert_ne!(old, current);
        assert!(!pulse.notify_back_online(old));
        assert!(!pulse.is_back_online());
        assert!(pulse.notify_back_online(current));
    }

    #[test]
    fn completion_wakes_every_waiter() {
        let pulse = Arc::new(PulseHandshake::new());
        let transaction = pulse.arm();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let pulse = Arc::clone(&pulse);
                thread::spawn(move || pulse.wait_online(Duration::from_secs(5)))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        pulse.notify_back_online(transaction);
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }
}
