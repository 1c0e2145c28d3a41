use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_MICRO: u64 = 1_000;

/// Monotonic nanosecond time source.
///
/// Request and response timestamps for one exchange must come from the same
/// `Clock`, otherwise RTT is meaningless.
pub trait Clock: Send + Sync + 'static {
    fn now_ns(&self) -> u64;
}

/// Nanoseconds since construction, backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to. Used to script exchange timing.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now.fetch_add(by, Ordering::SeqCst);
    }

    pub fn set(&self, now_ns: u64) {
        self.now.store(now_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Render nanoseconds as `seconds.mmm uuu nnn`.
pub fn format_nanos(nanos: u64) -> String {
    let seconds = nanos / NANOS_PER_SECOND;
    let remainder = nanos % NANOS_PER_SECOND;
    let millis = remainder / NANOS_PER_MILLI;
    let micros = (remainder % NANOS_PER_MILLI) / NANOS_PER_MICRO;
    let nanos = remainder % NANOS_PER_MICRO;
    format!("{seconds}.{millis:03} {micros:03} {nanos:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_nanos_groups_digits() {
        assert_eq!(format_nanos(0), "0.000 000 000");
        assert_eq!(format_nanos(1_234_567_890), "1.234 567 890");
        assert_eq!(format_nanos(42_000_007), "0.042 000 007");
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ns(), 100);
        clock.advance(Duration::from_micros(5));
        assert_eq!(clock.now_ns(), 5_100);
        clock.set(7);
        assert_eq!(clock.now_ns(), 7);
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let first = clock.now_ns();
        std::thread::sleep(Duration::from_millis(1));
        assert!(clock.now_ns() > first);
    }
}
