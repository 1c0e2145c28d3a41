use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::link::{LinkEvent, TransportLink};

/// In-memory host end of a duplex link.
///
/// Frames travel unmodified between the two ends. The hub end is a
/// [`LoopbackPeer`], which can also inject [`LinkEvent`]s and make host sends
/// fail.
pub struct LoopbackLink {
    to_hub: Sender<Bytes>,
    from_hub: Receiver<Bytes>,
    events: Receiver<LinkEvent>,
    shutdown_rx: Receiver<()>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    closed: AtomicBool,
    refuse_sends: Arc<AtomicBool>,
}

/// Hub end of a [`LoopbackLink`].
pub struct LoopbackPeer {
    from_host: Receiver<Bytes>,
    to_host: Sender<Bytes>,
    events: Sender<LinkEvent>,
    refuse_sends: Arc<AtomicBool>,
}

impl LoopbackLink {
    /// Create a connected host/hub pair.
    pub fn pair() -> (LoopbackLink, LoopbackPeer) {
        let (to_hub, from_host) = unbounded();
        let (to_host, from_hub) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let refuse_sends = Arc::new(AtomicBool::new(false));

        let link = LoopbackLink {
            to_hub,
            from_hub,
            events: events_rx,
            shutdown_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            closed: AtomicBool::new(false),
            refuse_sends: Arc::clone(&refuse_sends),
        };
        let peer = LoopbackPeer {
            from_host,
            to_host,
            events: events_tx,
            refuse_sends,
        };
        (link, peer)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl TransportLink for LoopbackLink {
    fn send(&self, frame: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.refuse_sends.load(Ordering::Acquire) {
            return Err(TransportError::Rejected("hub is not accepting frames".to_string()));
        }
        self.to_hub
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| TransportError::Rejected("hub endpoint dropped".to_string()))
    }

    fn recv(&self, timeout: Duration) -> Result<Option<Bytes>> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        select! {
            recv(self.from_hub) -> msg => msg.map(Some).map_err(|_| TransportError::Closed),
            recv(self.shutdown_rx) -> _ => Err(TransportError::Closed),
            default(timeout) => Ok(None),
        }
    }

    fn events(&self) -> Receiver<LinkEvent> {
        self.events.clone()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender wakes every `recv` parked on the shutdown channel.
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("loopback link closed");
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

impl LoopbackPeer {
    /// Block up to `timeout` for the next frame written by the host.
    pub fn recv(&self, timeout: Duration) -> Option<Bytes> {
        self.from_host.recv_timeout(timeout).ok()
    }

    /// Take a frame written by the host without blocking.
    pub fn try_recv(&self) -> Option<Bytes> {
        self.from_host.try_recv().ok()
    }

    /// Deliver a frame to the host.
    pub fn send(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.to_host
            .send(frame.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Report a reset/recovery transition to the host.
    pub fn signal(&self, event: LinkEvent) -> Result<()> {
        self.events.send(event).map_err(|_| TransportError::Closed)
    }

    /// Make subsequent host sends fail with [`TransportError::Rejected`].
    pub fn set_refuse_sends(&self, refuse: bool) {
        self.refuse_sends.store(refuse, Ordering::Release);
    }

    /// Number of host frames not yet taken by the hub end.
    pub fn pending(&self) -> usize {
        self.from_host.len()
    }
}
