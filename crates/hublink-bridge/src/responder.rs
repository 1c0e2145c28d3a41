use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use hublink_frame::{
    encode_frame, parse_frame, AppHeader, MessageKind, APP_HEADER_SIZE, DEFAULT_MAX_PAYLOAD,
    PULSE, TIMESYNC,
};
use hublink_transport::{TransportError, TransportLink};
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::error::{AppErrorCode, Result};
use crate::pulse::PULSE_PROBE;
use crate::timesync::GET_TIME;

/// Hub-side answers to the core protocol: GetTime and pulse probes.
///
/// Backs the simulated hub; requests for any other service are answered
/// with `Unsupported`.
pub struct HubResponder {
    clock: Arc<dyn Clock>,
    offset_ns: i64,
}

impl HubResponder {
    /// `offset_ns` is added to `clock` to produce hub time.
    pub fn new(clock: Arc<dyn Clock>, offset_ns: i64) -> Self {
        Self { clock, offset_ns }
    }

    pub fn hub_time_ns(&self) -> u64 {
        self.clock.now_ns().saturating_add_signed(self.offset_ns)
    }

    /// Build the response payload for one request payload.
    ///
    /// Returns `None` for anything that is not a request.
    pub fn respond(&self, payload: &[u8]) -> Option<Bytes> {
        let header = match AppHeader::decode(payload) {
            Ok(header) => header,
            Err(err) => {
                debug!(error = %err, "ignoring undecodable message");
                return None;
            }
        };
        if header.kind != MessageKind::Request {
            return None;
        }

        let mut response = header.response();
        let mut out = BytesMut::with_capacity(APP_HEADER_SIZE + 8);
        match (header.handle, header.command) {
            (TIMESYNC, GET_TIME) => {
                response.encode(&mut out);
                out.put_u64_le(self.hub_time_ns());
            }
            (PULSE, PULSE_PROBE) => response.encode(&mut out),
            _ => {
                response.status = AppErrorCode::Unsupported as u8;
                response.encode(&mut out);
            }
        }
        trace!(
            handle = header.handle,
            command = header.command,
            "answering request"
        );
        Some(out.freeze())
    }

    /// Answer requests arriving on `link` until `stop` is set or the link
    /// closes. Returns the number of responses sent.
    pub fn serve(&self, link: &dyn TransportLink, stop: &AtomicBool, poll: Duration) -> Result<u64> {
        let mut wire = BytesMut::new();
        let mut answered = 0u64;

        while !stop.load(Ordering::Acquire) {
            let raw = match link.recv(poll) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(TransportError::Closed) => break,
                Err(TransportError::Rejected(reason)) => {
                    warn!(%reason, "dropping unframeable bytes from host");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let frame = match parse_frame(&raw, DEFAULT_MAX_PAYLOAD) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "dropping malformed frame from host");
                    continue;
                }
            };
            let Some(reply) = self.respond(frame.payload()) else {
                continue;
            };

            wire.clear();
            encode_frame(&reply, &mut wire)?;
            link.send(&wire)?;
            answered += 1;
        }
        debug!(answered, "responder stopped");
        Ok(answered)
    }
}
