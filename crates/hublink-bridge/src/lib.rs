//! Messaging core between a host and a sensor hub.
//!
//! A [`ConnectionBridge`] owns the inbound and outbound queues and runs four
//! worker threads over a [`TransportLink`](hublink_transport::TransportLink).
//! Protocol clients sit on top: [`RequestResponseClient`] for synchronous
//! exchanges, [`TimesyncClient`] for clock offset estimation, and the pulse
//! handshake for liveness after a hub reset. [`HubContext`] bundles them.

pub mod bridge;
pub mod client;
pub mod clock;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod pulse;
pub mod queue;
pub mod responder;
pub mod summary;
pub mod timesync;

pub use bridge::{BridgeBuilder, BridgeCallback, BridgeStats, ConnectionBridge, LoggingCallback};
pub use client::{Exchange, OpenState, RequestResponseClient, ResponseHandler};
pub use clock::{format_nanos, Clock, ManualClock, MonotonicClock};
pub use config::{BridgeConfig, HubConfig, InboundOverflow, PulseConfig, TimesyncConfig};
pub use context::HubContext;
pub use discovery::DiscoveryGate;
pub use error::{AppErrorCode, BridgeError, Result};
pub use pulse::{PulseHandshake, PULSE_PROBE};
pub use queue::BoundedQueue;
pub use responder::HubResponder;
pub use summary::{Direction, MessageSummary};
pub use timesync::{clock_offset, TimesyncClient, TimesyncResult, GET_TIME, GET_TIME_RESPONSE_LEN};
