use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use hublink_frame::{AppHeader, Frame, APP_HEADER_SIZE};
use serde::Serialize;
use tracing::{debug, error, trace};

use crate::bridge::ConnectionBridge;
use crate::clock::Clock;
use crate::error::{BridgeError, Result};

/// Session state of a client as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenState {
    /// Hub reset; no exchange can complete.
    Closed,
    /// Link is back, waiting for the hub to answer a pulse probe.
    Opening,
    Opened,
}

/// Receives responses routed by the bridge's Handler.
///
/// Called on the Handler thread: implementations must not block.
pub trait ResponseHandler: Send + Sync + 'static {
    /// Handle a response addressed to this handler's handle.
    fn on_response(&self, header: &AppHeader, payload: &Bytes) -> Result<()>;

    /// The hub session moved to `state`.
    fn set_open_state(&self, _state: OpenState) {}

    /// The Sender could not put request `transaction` on the link.
    fn on_send_failed(&self, _transaction: u8, _error: BridgeError) {}
}

/// One completed request/response exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request_time_ns: u64,
    pub response_time_ns: u64,
    pub header: AppHeader,
    /// Full response payload, header included.
    pub payload: Bytes,
}

impl Exchange {
    pub fn rtt_ns(&self) -> u64 {
        self.response_time_ns.saturating_sub(self.request_time_ns)
    }

    /// The payload after the application header.
    pub fn body(&self) -> &[u8] {
        &self.payload[APP_HEADER_SIZE..]
    }
}

struct ClientState {
    open_state: OpenState,
    next_transaction: u8,
    /// Transaction of the request in flight, if any.
    pending: Option<u8>,
    request_time_ns: Option<u64>,
    response_ready: bool,
    response: Option<(AppHeader, Bytes)>,
    response_time_ns: u64,
    /// Validation failure recorded against the pending exchange.
    protocol_error: Option<BridgeError>,
    /// Link failure for the pending request, reported by the Sender.
    send_error: Option<BridgeError>,
}

/// Synchronous exchange state machine for one service handle.
///
/// At most one request is in flight per client; a second concurrent
/// [`send_and_wait`](Self::send_and_wait) fails with [`BridgeError::Busy`].
/// The client's lock is never held while the bridge queues are touched.
pub struct RequestResponseClient {
    handle: u8,
    name: &'static str,
    bridge: Arc<ConnectionBridge>,
    clock: Arc<dyn Clock>,
    expected_response_len: Option<usize>,
    state: Mutex<ClientState>,
    response_cond: Condvar,
}

impl RequestResponseClient {
    /// Create a client for `handle` and register it with the bridge.
    ///
    /// With `expected_response_len` set, successful responses must be exactly
    /// that many bytes (header included). Error responses (non-zero status)
    /// are accepted at any length.
    pub fn register(
        bridge: &Arc<ConnectionBridge>,
        handle: u8,
        name: &'static str,
        expected_response_len: Option<usize>,
    ) -> Result<Arc<Self>> {
        let client = Arc::new(Self {
            handle,
            name,
            bridge: Arc::clone(bridge),
            clock: bridge.clock(),
            expected_response_len,
            state: Mutex::new(ClientState {
                open_state: OpenState::Opened,
                next_transaction: 0,
                pending: None,
                request_time_ns: None,
                response_ready: false,
                response: None,
                response_time_ns: 0,
                protocol_error: None,
                send_error: None,
            }),
            response_cond: Condvar::new(),
        });
        bridge.register(handle, &client)?;
        debug!(client = name, handle, "client registered");
        Ok(client)
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self) -> u8 {
        self.handle
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn open_state(&self) -> OpenState {
        self.lock().open_state
    }

    /// Send `command` with `body` and block up to `timeout` for the answer.
    pub fn send_and_wait(&self, command: u16, body: &[u8], timeout: Duration) -> Result<Exchange> {
        let transaction = self.begin()?;
        let outcome = self.exchange(transaction, command, body, timeout);

        let mut state = self.lock();
        state.pending = None;
        state.response_ready = false;
        state.response = None;
        drop(state);

        outcome
    }

    fn begin(&self) -> Result<u8> {
        let mut state = self.lock();
        if state.pending.is_some() {
            error!(
                client = self.name,
                "send_and_wait called while a request is already in flight"
            );
            return Err(BridgeError::Busy);
        }
        if state.open_state != OpenState::Opened {
            return Err(BridgeError::NotReady);
        }

        let transaction = state.next_transaction;
        state.next_transaction = state.next_transaction.wrapping_add(1);
        state.pending = Some(transaction);
        state.request_time_ns = None;
        state.response_ready = false;
        state.response = None;
        state.protocol_error = None;
        state.send_error = None;
        Ok(transaction)
    }

    fn exchange(
        &self,
        transaction: u8,
        command: u16,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Exchange> {
        let header = AppHeader::request(self.handle, transaction, command);
        let payload = build_request(&header, body)?;

        let request_time_ns = self.clock.now_ns();
        self.lock().request_time_ns = Some(request_time_ns);
        self.bridge.send(Frame::new(payload))?;
        trace!(client = self.name, transaction, command, "request queued");

        let guard = self.lock();
        let (mut state, _) = self
            .response_cond
            .wait_timeout_while(guard, timeout, |s| {
                !s.response_ready
                    && s.send_error.is_none()
                    && s.open_state != OpenState::Closed
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.response_ready {
            state.response_ready = false;
            if let Some((header, payload)) = state.response.take() {
                if header.status != 0 {
                    return Err(BridgeError::Status(header.status));
                }
                return Ok(Exchange {
                    request_time_ns,
                    response_time_ns: state.response_time_ns,
                    header,
                    payload,
                });
            }
        }
        if let Some(err) = state.send_error.take() {
            return Err(err);
        }
        if state.open_state == OpenState::Closed {
            return Err(BridgeError::Closed);
        }
        if let Some(err) = state.protocol_error.take() {
            return Err(err);
        }
        Err(BridgeError::Timeout(timeout))
    }
}

impl ResponseHandler for RequestResponseClient {
    fn on_response(&self, header: &AppHeader, payload: &Bytes) -> Result<()> {
        let mut state = self.lock();
        if state.pending != Some(header.transaction) || state.response_ready {
            return Err(BridgeError::UnexpectedResponse {
                handle: header.handle,
                command: header.command,
            });
        }

        if let Some(expected) = self.expected_response_len {
            if header.status == 0 && payload.len() != expected {
                state.protocol_error = Some(BridgeError::InvalidLength {
                    expected,
                    actual: payload.len(),
                });
                return Err(BridgeError::InvalidLength {
                    expected,
                    actual: payload.len(),
                });
            }
        }

        state.response_time_ns = self.clock.now_ns();
        state.response = Some((*header, payload.clone()));
        state.response_ready = true;
        drop(state);
        self.response_cond.notify_all();
        Ok(())
    }

    fn set_open_state(&self, open_state: OpenState) {
        let mut state = self.lock();
        if state.open_state == open_state {
            return;
        }
        debug!(client = self.name, state = ?open_state, "client session state changed");
        state.open_state = open_state;
        drop(state);
        if open_state == OpenState::Closed {
            self.response_cond.notify_all();
        }
    }

    fn on_send_failed(&self, transaction: u8, error: BridgeError) {
        let mut state = self.lock();
        if state.pending != Some(transaction) || state.response_ready {
            return;
        }
        debug!(client = self.name, transaction, error = %error, "request was not sent");
        state.send_error = Some(error);
        drop(state);
        self.response_cond.notify_all();
    }
}

/// Header plus body, built without aborting on allocation failure.
fn build_request(header: &AppHeader, body: &[u8]) -> Result<Bytes> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(APP_HEADER_SIZE + body.len())
        .map_err(|_| BridgeError::OutOfMemory)?;
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(body);
    Ok(Bytes::from(buf))
}
