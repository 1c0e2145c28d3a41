use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use hublink_transport::{IpcStream, LinkEvent, TransportError, TransportLink, UnixDomainSocket};
use tracing::{debug, warn};

use crate::codec::FrameConfig;
use crate::error::FrameError;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// [`TransportLink`] over a connected byte stream.
///
/// Frame boundaries are recovered with a [`FrameReader`]. When the far end
/// hangs up, one [`LinkEvent::Reset`] is reported and the link stays closed;
/// a stream link never recovers by itself.
pub struct StreamLink {
    reader: Mutex<FrameReader<IpcStream>>,
    writer: Mutex<FrameWriter<IpcStream>>,
    control: IpcStream,
    events_tx: Sender<LinkEvent>,
    events_rx: Receiver<LinkEvent>,
    closed: AtomicBool,
    reset_reported: AtomicBool,
}

impl StreamLink {
    /// Wrap an already-connected stream.
    pub fn new(stream: IpcStream, config: FrameConfig) -> Result<Self, TransportError> {
        stream.set_write_timeout(config.write_timeout)?;
        let writer = stream.try_clone()?;
        let control = stream.try_clone()?;
        let (events_tx, events_rx) = unbounded();

        Ok(Self {
            reader: Mutex::new(FrameReader::with_config(stream, config.clone())),
            writer: Mutex::new(FrameWriter::with_config(writer, config)),
            control,
            events_tx,
            events_rx,
            closed: AtomicBool::new(false),
            reset_reported: AtomicBool::new(false),
        })
    }

    /// Connect to a hub listening on a Unix socket.
    pub fn connect(path: impl AsRef<Path>, config: FrameConfig) -> Result<Self, TransportError> {
        let stream = UnixDomainSocket::connect(path)?;
        Self::new(stream, config)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn report_reset(&self) {
        if !self.reset_reported.swap(true, Ordering::AcqRel) {
            debug!("hub hung up; reporting reset");
            let _ = self.events_tx.send(LinkEvent::Reset);
        }
    }
}

impl TransportLink for StreamLink {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_wire(frame).map_err(into_transport_error)
    }

    fn recv(&self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        reader
            .get_ref()
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        match reader.read_wire() {
            Ok(wire) => Ok(Some(wire)),
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(FrameError::ConnectionClosed) => {
                if !self.is_closed() {
                    self.report_reset();
                }
                self.closed.store(true, Ordering::Release);
                Err(TransportError::Closed)
            }
            Err(FrameError::Io(err)) => {
                if self.is_closed() {
                    return Err(TransportError::Closed);
                }
                Err(TransportError::Io(err))
            }
            Err(err) => {
                let dropped = reader.discard_buffered();
                warn!(error = %err, dropped, "dropping unframeable bytes");
                Err(TransportError::Rejected(err.to_string()))
            }
        }
    }

    fn events(&self) -> Receiver<LinkEvent> {
        self.events_rx.clone()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "stream shutdown failed");
        }
        debug!("stream link closed");
    }

    fn name(&self) -> &'static str {
        "stream"
    }
}

fn into_transport_error(err: FrameError) -> TransportError {
    match err {
        FrameError::Io(err) => TransportError::Io(err),
        FrameError::ConnectionClosed => TransportError::Closed,
        other => TransportError::Rejected(other.to_string()),
    }
}
