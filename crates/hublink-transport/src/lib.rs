//! Physical link abstraction between the host and the sensor hub.
//!
//! The bridge never touches a device node or socket directly. It consumes a
//! [`TransportLink`], which moves one encoded frame at a time and reports
//! hub reset/recovery transitions as [`LinkEvent`]s.
//!
//! Provided links:
//! - [`LoopbackLink`]: in-memory duplex, the hub end is a [`LoopbackPeer`]
//! - [`UnixDomainSocket`] / [`IpcStream`]: byte streams for a hub simulator
//!   (framed into a link by `hublink-frame`)

pub mod error;
pub mod link;
pub mod loopback;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use link::{LinkEvent, TransportLink};
pub use loopback::{LoopbackLink, LoopbackPeer};
#[cfg(unix)]
pub use stream::IpcStream;
#[cfg(unix)]
pub use uds::UnixDomainSocket;
