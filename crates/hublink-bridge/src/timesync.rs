use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hublink_frame::{APP_HEADER_SIZE, TIMESYNC};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bridge::ConnectionBridge;
use crate::client::RequestResponseClient;
use crate::config::TimesyncConfig;
use crate::error::{AppErrorCode, Result};

/// GetTime command on the timesync handle.
pub const GET_TIME: u16 = 0x0001;

/// A GetTime response is the header plus one u64 LE hub timestamp.
pub const GET_TIME_RESPONSE_LEN: usize = APP_HEADER_SIZE + 8;

/// Outcome of a time sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimesyncResult {
    /// `Blocked` while a run is in progress.
    pub error: AppErrorCode,
    /// Smallest RTT observed; `u64::MAX` until the first sample.
    pub rtt_ns: u64,
    /// Hub clock minus host clock, from the minimum-RTT sample.
    pub offset_ns: i64,
}

impl TimesyncResult {
    fn with_error(error: AppErrorCode) -> Self {
        Self {
            error,
            rtt_ns: u64::MAX,
            offset_ns: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_success()
    }

    /// The minimum RTT, if any sample was taken.
    pub fn rtt(&self) -> Option<Duration> {
        (self.rtt_ns != u64::MAX).then(|| Duration::from_nanos(self.rtt_ns))
    }
}

/// Offset of the hub clock, assuming the request and response legs took
/// equally long.
pub fn clock_offset(hub_time_ns: u64, request_time_ns: u64, rtt_ns: u64) -> i64 {
    let offset = i128::from(hub_time_ns) - i128::from(request_time_ns) - i128::from(rtt_ns / 2);
    i64::try_from(offset).unwrap_or(if offset < 0 { i64::MIN } else { i64::MAX })
}

/// Estimates the hub clock offset from repeated GetTime exchanges.
///
/// Only the sample with the smallest RTT ever updates the offset. The first
/// failed exchange ends the run with that failure recorded.
pub struct TimesyncClient {
    client: Arc<RequestResponseClient>,
    bridge: Arc<ConnectionBridge>,
    config: TimesyncConfig,
    result: Mutex<TimesyncResult>,
}

impl TimesyncClient {
    pub fn new(bridge: &Arc<ConnectionBridge>, config: TimesyncConfig) -> Result<Self> {
        config.validate()?;
        let client = RequestResponseClient::register(
            bridge,
            TIMESYNC,
            "timesync",
            Some(GET_TIME_RESPONSE_LEN),
        )?;
        Ok(Self {
            client,
            bridge: Arc::clone(bridge),
            config,
            // Never run yet.
            result: Mutex::new(TimesyncResult::with_error(AppErrorCode::Unspecified)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TimesyncResult> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Result of the latest run (`Blocked` while one is in progress).
    pub fn last_result(&self) -> TimesyncResult {
        *self.lock()
    }

    /// Run a full measurement. A call made while another run is in progress
    /// returns `Blocked` at once and sends nothing.
    pub fn run_time_sync(&self) -> TimesyncResult {
        {
            let mut current = self.lock();
            if current.error == AppErrorCode::Blocked {
                error!("time sync requested while a run is already in progress");
                return TimesyncResult::with_error(AppErrorCode::Blocked);
            }
            *current = TimesyncResult::with_error(AppErrorCode::Blocked);
        }

        let result = self.measure();
        *self.lock() = result;

        if result.is_success() {
            info!(
                rtt_ns = result.rtt_ns,
                offset_ns = result.offset_ns,
                "time sync complete"
            );
        } else {
            warn!(error = %result.error, "time sync failed");
        }
        result
    }

    fn measure(&self) -> TimesyncResult {
        let mut result = TimesyncResult::with_error(AppErrorCode::Blocked);

        if !self
            .bridge
            .discovery()
            .wait_complete(self.config.discovery_timeout)
        {
            warn!(
                timeout_ms = self.config.discovery_timeout.as_millis() as u64,
                "hub discovery did not complete; time sync not started"
            );
            result.error = AppErrorCode::NotReady;
            return result;
        }

        for attempt in 1..=self.config.measurement_count {
            let timeout = self.config.response_timeout;
            let exchange = match self.client.send_and_wait(GET_TIME, &[], timeout) {
                Ok(exchange) => exchange,
                Err(err) => {
                    warn!(attempt, error = %err, "time sync exchange failed");
                    result.error = AppErrorCode::from(&err);
                    break;
                }
            };

            let Some(hub_time_ns) = read_hub_time(exchange.body()) else {
                result.error = AppErrorCode::InvalidLength;
                break;
            };
            let rtt_ns = exchange.rtt_ns();
            debug!(attempt, rtt_ns, hub_time_ns, "time sync sample");

            if rtt_ns < result.rtt_ns {
                result.rtt_ns = rtt_ns;
                result.offset_ns = clock_offset(hub_time_ns, exchange.request_time_ns, rtt_ns);
            }
        }

        if result.error == AppErrorCode::Blocked {
            result.error = if result.rtt().is_some() {
                AppErrorCode::None
            } else {
                AppErrorCode::Unspecified
            };
        }
        result
    }
}

fn read_hub_time(body: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = body.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_uses_half_the_rtt() {
        // Request at 1s, 10ms round trip, hub read 5.5s at the midpoint.
        let offset = clock_offset(5_505_000_000, 1_000_000_000, 10_000_000);
        assert_eq!(offset, 4_500_000_000);
    }

    #[test]
    fn offset_can_be_negative() {
        assert_eq!(clock_offset(100, 1_000, 200), -1_000);
    }

    #[test]
    fn offset_saturates() {
        assert_eq!(clock_offset(u64::MAX, 0, 0), i64::MAX);
    }

    #[test]
    fn hub_time_requires_exact_width() {
        assert_eq!(read_hub_time(&7u64.to_le_bytes()), Some(7));
        assert_eq!(read_hub_time(&[0u8; 7]), None);
    }

    #[test]
    fn fresh_result_reports_no_sample() {
        let result = TimesyncResult::with_error(AppErrorCode::Blocked);
        assert_eq!(result.rtt(), None);
        assert!(!result.is_success());
    }
}
