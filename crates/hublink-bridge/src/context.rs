use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hublink_transport::TransportLink;
use tracing::warn;

use crate::bridge::{BridgeCallback, ConnectionBridge, LoggingCallback};
use crate::config::{HubConfig, TimesyncConfig};
use crate::error::Result;
use crate::timesync::{TimesyncClient, TimesyncResult};

/// Everything a host needs to talk to one hub: the bridge, the timesync
/// client and the liveness handshake.
///
/// Passed by reference to whoever needs it; there is no global instance.
pub struct HubContext {
    bridge: Arc<ConnectionBridge>,
    timesync: TimesyncClient,
    /// Offset from the latest successful time sync.
    offset_ns: Mutex<Option<i64>>,
}

impl HubContext {
    /// Start a bridge on `link` with a monotonic clock and logging callback.
    pub fn start(link: impl TransportLink, config: HubConfig) -> Result<Self> {
        Self::start_with_callback(link, config, Arc::new(LoggingCallback))
    }

    pub fn start_with_callback(
        link: impl TransportLink,
        config: HubConfig,
        callback: Arc<dyn BridgeCallback>,
    ) -> Result<Self> {
        config.validate()?;
        let bridge = ConnectionBridge::builder(link)
            .config(config.bridge)
            .pulse(config.pulse)
            .callback(callback)
            .start()?;
        Self::with_bridge(bridge, config.timesync)
    }

    /// Build a context around an already-running bridge.
    pub fn with_bridge(
        bridge: Arc<ConnectionBridge>,
        timesync: TimesyncConfig,
    ) -> Result<Self> {
        let timesync = TimesyncClient::new(&bridge, timesync)?;
        Ok(Self {
            bridge,
            timesync,
            offset_ns: Mutex::new(None),
        })
    }

    /// Measure RTT and clock offset against the hub.
    pub fn run_time_sync(&self) -> TimesyncResult {
        let result = self.timesync.run_time_sync();
        if result.is_success() {
            *self.offset_ns.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(result.offset_ns);
        }
        result
    }

    /// Probe the hub and wait up to `timeout` for it to answer.
    pub fn wait_for_hub_online(&self, timeout: Duration) -> bool {
        match self.bridge.wait_for_hub_online(timeout) {
            Ok(online) => online,
            Err(err) => {
                warn!(error = %err, "could not probe hub");
                false
            }
        }
    }

    /// Convert a hub timestamp to the host timeline, using the latest
    /// successful time sync. `None` before the first one.
    pub fn estimated_host_time_ns(&self, hub_time_ns: u64) -> Option<u64> {
        let offset = (*self.offset_ns.lock().unwrap_or_else(PoisonError::into_inner))?;
        Some(hub_time_ns.saturating_add_signed(offset.saturating_neg()))
    }

    pub fn bridge(&self) -> &Arc<ConnectionBridge> {
        &self.bridge
    }

    pub fn timesync(&self) -> &TimesyncClient {
        &self.timesync
    }

    pub fn dump(&self) -> String {
        self.bridge.dump()
    }

    pub fn close(&self) {
        self.bridge.close();
    }
}
