//! Host-side messaging core for a sensor hub coprocessor.
//!
//! hublink moves framed messages between a host and a continuously running
//! hub, offers synchronous request/response clients on top, measures the hub
//! clock offset and confirms hub liveness across resets.
//!
//! # Crate Structure
//!
//! - [`transport`]: the link abstraction plus loopback and Unix socket links
//! - [`frame`]: magic-prefixed framing and the application header
//! - [`bridge`]: connection bridge, clients, timesync and pulse handshake

/// Re-export transport types.
pub mod transport {
    pub use hublink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hublink_frame::*;
}

/// Re-export bridge types.
pub mod bridge {
    pub use hublink_bridge::*;
}
