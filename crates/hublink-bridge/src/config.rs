//! Construction-time configuration.
//!
//! Every struct deserializes from JSON with missing fields taking their
//! defaults. Durations are written as integer milliseconds.

use std::path::Path;
use std::time::Duration;

use hublink_frame::DEFAULT_MAX_PAYLOAD;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// What the Listener does when the inbound queue is full.
///
/// The hub cannot be backpressured at the transport level, so one of the two
/// frames has to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundOverflow {
    /// Evict the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Drop the newly received frame.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    pub inbound_overflow: InboundOverflow,
    pub max_payload_size: usize,
    /// Longest single `recv` the Listener issues before rechecking for close.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Dispatches slower than this are logged.
    #[serde(with = "millis")]
    pub slow_handler_threshold: Duration,
    /// Number of message summaries retained for `dump()`.
    pub history_capacity: usize,
    /// Probe the hub as soon as the bridge starts.
    pub probe_on_start: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 256,
            outbound_capacity: 64,
            inbound_overflow: InboundOverflow::DropOldest,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            poll_interval: Duration::from_millis(100),
            slow_handler_threshold: Duration::from_secs(1),
            history_capacity: 32,
            probe_on_start: true,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        nonzero("bridge.inbound_capacity", self.inbound_capacity)?;
        nonzero("bridge.outbound_capacity", self.outbound_capacity)?;
        nonzero("bridge.max_payload_size", self.max_payload_size)?;
        nonzero("bridge.history_capacity", self.history_capacity)?;
        nonzero_duration("bridge.poll_interval", self.poll_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimesyncConfig {
    /// Number of GetTime exchanges per run (N).
    pub measurement_count: usize,
    /// Bounded wait for each response.
    #[serde(with = "millis")]
    pub response_timeout: Duration,
    /// Bounded wait for the discovery gate before a run sends anything.
    #[serde(with = "millis")]
    pub discovery_timeout: Duration,
}

impl Default for TimesyncConfig {
    fn default() -> Self {
        Self {
            measurement_count: 3,
            response_timeout: Duration::from_secs(1),
            discovery_timeout: Duration::from_secs(10),
        }
    }
}

impl TimesyncConfig {
    pub fn validate(&self) -> Result<()> {
        nonzero("timesync.measurement_count", self.measurement_count)?;
        nonzero_duration("timesync.response_timeout", self.response_timeout)?;
        nonzero_duration("timesync.discovery_timeout", self.discovery_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// How long a recovery probe may go unanswered before it is reported.
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl PulseConfig {
    pub fn validate(&self) -> Result<()> {
        nonzero_duration("pulse.timeout", self.timeout)
    }
}

/// Complete configuration for a [`HubContext`](crate::HubContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub bridge: BridgeConfig,
    pub timesync: TimesyncConfig,
    pub pulse: PulseConfig,
}

impl HubConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: HubConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BridgeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.bridge.validate()?;
        self.timesync.validate()?;
        self.pulse.validate()
    }
}

fn nonzero(field: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(BridgeError::InvalidConfig(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(())
}

fn nonzero_duration(field: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(BridgeError::InvalidConfig(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(())
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
