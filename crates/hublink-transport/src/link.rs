use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::Receiver;

use crate::error::Result;

/// Transport-level hub state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The hub went away (restart, crash, link torn down).
    Reset,
    /// The hub is reachable again after a reset.
    Recovered,
}

impl LinkEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkEvent::Reset => "reset",
            LinkEvent::Recovered => "recovered",
        }
    }
}

/// The physical channel between the host and the hub.
///
/// Implementations are shared between the bridge's worker threads, so every
/// method takes `&self`. One call to [`send`](TransportLink::send) carries one
/// complete encoded frame; one successful [`recv`](TransportLink::recv)
/// yields one complete frame's raw bytes.
pub trait TransportLink: Send + Sync + 'static {
    /// Write one encoded frame to the hub.
    ///
    /// A failure is terminal for that frame; callers do not retry.
    fn send(&self, frame: &[u8]) -> Result<()>;

    /// Block up to `timeout` for the next inbound frame.
    ///
    /// Returns `Ok(None)` when the timeout expires with nothing received and
    /// `Err(TransportError::Closed)` once the link has been closed.
    fn recv(&self, timeout: Duration) -> Result<Option<Bytes>>;

    /// Stream of reset/recovery transitions.
    ///
    /// Every call returns a handle to the same stream; events are not
    /// replayed to receivers created later.
    fn events(&self) -> Receiver<LinkEvent>;

    /// Close the link, unblocking pending `recv` calls.
    fn close(&self);

    /// Link name for diagnostics.
    fn name(&self) -> &'static str;
}
