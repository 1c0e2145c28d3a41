#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use hublink_bridge::BridgeConfig;
use hublink_frame::{encode_frame, parse_frame, AppHeader, DEFAULT_MAX_PAYLOAD};
use hublink_transport::LoopbackPeer;

pub const STEP: Duration = Duration::from_millis(20);

/// Bridge config that does not probe at start and polls quickly.
pub fn quiet_config() -> BridgeConfig {
    BridgeConfig {
        probe_on_start: false,
        poll_interval: Duration::from_millis(10),
        ..BridgeConfig::default()
    }
}

pub fn wire(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    encode_frame(payload, &mut buf).unwrap();
    buf.freeze()
}

/// Encode a response to `request` with `body` appended to the header.
pub fn response(request: &AppHeader, body: &[u8]) -> Bytes {
    let mut payload = request.response().to_bytes().to_vec();
    payload.extend_from_slice(body);
    wire(&payload)
}

pub fn notification(handle: u8, command: u16) -> Bytes {
    wire(&AppHeader::notification(handle, command).to_bytes())
}

/// Next host frame, decoded into header and full payload.
pub fn next_request(peer: &LoopbackPeer, timeout: Duration) -> Option<(AppHeader, Bytes)> {
    let raw = peer.recv(timeout)?;
    let frame = parse_frame(&raw, DEFAULT_MAX_PAYLOAD).unwrap();
    let header = AppHeader::decode(frame.payload()).unwrap();
    Some((header, frame.into_payload()))
}

pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

/// A scripted hub running on its own thread until dropped.
pub struct Hub {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Hub {
    /// Run `on_request` for every host frame; whatever it returns is sent back.
    pub fn spawn(
        peer: LoopbackPeer,
        mut on_request: impl FnMut(&AppHeader, &Bytes) -> Option<Bytes> + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let Some((header, payload)) = next_request(&peer, STEP) else {
                        continue;
                    };
                    if let Some(reply) = on_request(&header, &payload) {
                        let _ = peer.send(reply);
                    }
                }
            })
        };
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
