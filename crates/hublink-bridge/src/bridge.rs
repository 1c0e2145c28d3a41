use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{at, bounded, never, select, unbounded, Receiver, Sender};
use hublink_frame::{
    encode_frame, parse_frame, AppHeader, Frame, FrameError, MessageKind, PULSE,
};
use hublink_transport::{LinkEvent, TransportError, TransportLink};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::client::{OpenState, ResponseHandler};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{BridgeConfig, InboundOverflow, PulseConfig};
use crate::discovery::DiscoveryGate;
use crate::error::{BridgeError, Result};
use crate::pulse::{PulseHandshake, PULSE_PROBE};
use crate::queue::BoundedQueue;
use crate::summary::{Direction, MessageSummary};

/// Receives hub messages that are not responses to a host request.
///
/// Called on the Handler thread: long work must be handed off.
pub trait BridgeCallback: Send + Sync + 'static {
    /// A notification, or a request initiated by the hub.
    fn on_message(&self, header: &AppHeader, payload: &Bytes);

    /// The hub came back after a reset and answered a pulse probe.
    fn on_hub_restarted(&self, _recovery: Duration) {}
}

/// Callback that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

impl BridgeCallback for LoggingCallback {
    fn on_message(&self, header: &AppHeader, payload: &Bytes) {
        debug!(
            handle = header.handle,
            kind = header.kind.as_str(),
            command = header.command,
            size = payload.len(),
            "unsolicited hub message"
        );
    }

    fn on_hub_restarted(&self, recovery: Duration) {
        info!(recovery_ms = recovery.as_millis() as u64, "hub restarted");
    }
}

/// Snapshot of bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub inbound_dropped: u64,
    pub send_failures: u64,
    pub protocol_errors: u64,
    pub unexpected_responses: u64,
    pub discarded_at_close: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    inbound_dropped: AtomicU64,
    send_failures: AtomicU64,
    protocol_errors: AtomicU64,
    unexpected_responses: AtomicU64,
    discarded_at_close: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

struct InboundFrame {
    payload: Bytes,
    received_ns: u64,
}

/// A probe the StateMonitor sent itself and is waiting on.
struct Probe {
    transaction: u8,
    deadline: Instant,
    reason: &'static str,
}

struct Shared {
    link: Arc<dyn TransportLink>,
    config: BridgeConfig,
    pulse_config: PulseConfig,
    clock: Arc<dyn Clock>,
    callback: Arc<dyn BridgeCallback>,
    inbound: BoundedQueue<InboundFrame>,
    outbound: BoundedQueue<Frame>,
    history: BoundedQueue<MessageSummary>,
    routes: RwLock<HashMap<u8, Weak<dyn ResponseHandler>>>,
    session: Mutex<OpenState>,
    pulse: PulseHandshake,
    discovery: DiscoveryGate,
    counters: Counters,
    closed: AtomicBool,
}

/// Builder for a [`ConnectionBridge`].
pub struct BridgeBuilder {
    link: Arc<dyn TransportLink>,
    config: BridgeConfig,
    pulse: PulseConfig,
    clock: Arc<dyn Clock>,
    callback: Arc<dyn BridgeCallback>,
}

impl BridgeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pulse(mut self, pulse: PulseConfig) -> Self {
        self.pulse = pulse;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn BridgeCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Validate the configuration and start the four worker threads.
    pub fn start(self) -> Result<Arc<ConnectionBridge>> {
        self.config.validate()?;
        self.pulse.validate()?;

        let shared = Arc::new(Shared {
            inbound: BoundedQueue::new("inbound", self.config.inbound_capacity)?,
            outbound: BoundedQueue::new("outbound", self.config.outbound_capacity)?,
            history: BoundedQueue::new("history", self.config.history_capacity)?,
            link: self.link,
            config: self.config,
            pulse_config: self.pulse,
            clock: self.clock,
            callback: self.callback,
            routes: RwLock::new(HashMap::new()),
            session: Mutex::new(OpenState::Opened),
            pulse: PulseHandshake::new(),
            discovery: DiscoveryGate::new(),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
        });

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (ack_tx, ack_rx) = unbounded::<u8>();
        let bridge = Arc::new(ConnectionBridge {
            shared: Arc::clone(&shared),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(Vec::with_capacity(4)),
        });

        let events = shared.link.events();
        let spawned = [
            spawn_worker("listener", {
                let shared = Arc::clone(&shared);
                move || run_listener(&shared)
            }),
            spawn_worker("handler", {
                let shared = Arc::clone(&shared);
                move || run_handler(&shared, &ack_tx)
            }),
            spawn_worker("sender", {
                let shared = Arc::clone(&shared);
                move || run_sender(&shared)
            }),
            spawn_worker("state-monitor", {
                let shared = Arc::clone(&shared);
                move || run_state_monitor(&shared, events, ack_rx, shutdown_rx)
            }),
        ];

        let mut first_error = None;
        {
            let mut workers = bridge.workers.lock().unwrap_or_else(PoisonError::into_inner);
            for result in spawned {
                match result {
                    Ok(handle) => workers.push(handle),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            bridge.close();
            return Err(err);
        }

        info!(link = shared.link.name(), "bridge started");
        Ok(bridge)
    }
}

fn spawn_worker(
    name: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("hublink-{name}"))
        .spawn(body)
        .map_err(|source| BridgeError::Spawn { name, source })
}

/// Moves frames between protocol clients and a [`TransportLink`].
///
/// Four long-lived threads share the bridge state:
/// - Listener: link → inbound queue
/// - Handler: inbound queue → client response handlers or the [`BridgeCallback`]
/// - Sender: outbound queue → link, in enqueue order
/// - StateMonitor: link reset/recovery events and pulse acknowledgements
///
/// [`close`](Self::close) (also run on drop) stops and joins all four.
pub struct ConnectionBridge {
    shared: Arc<Shared>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionBridge {
    pub fn builder(link: impl TransportLink) -> BridgeBuilder {
        BridgeBuilder {
            link: Arc::new(link),
            config: BridgeConfig::default(),
            pulse: PulseConfig::default(),
            clock: Arc::new(MonotonicClock::new()),
            callback: Arc::new(LoggingCallback),
        }
    }

    /// Start a bridge with a monotonic clock and a logging callback.
    pub fn start(link: impl TransportLink, config: BridgeConfig) -> Result<Arc<Self>> {
        Self::builder(link).config(config).start()
    }

    /// Queue a frame for the Sender. Fails fast when the outbound queue is full.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.shared.enqueue(frame)
    }

    /// Route responses for `handle` to `handler`.
    ///
    /// The bridge keeps only a weak reference; dropping the handler
    /// unregisters it.
    pub fn register<H: ResponseHandler>(&self, handle: u8, handler: &Arc<H>) -> Result<()> {
        if handle == PULSE {
            return Err(BridgeError::InvalidConfig(
                "the pulse handle is owned by the bridge".to_string(),
            ));
        }
        {
            let mut routes = self
                .shared
                .routes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if routes.get(&handle).is_some_and(|h| h.strong_count() > 0) {
                return Err(BridgeError::InvalidConfig(format!(
                    "handle 0x{handle:02x} already has a client"
                )));
            }
            routes.insert(handle, Arc::downgrade(handler) as Weak<dyn ResponseHandler>);
        }
        handler.set_open_state(self.session_state());
        Ok(())
    }

    /// Probe the hub and block up to `timeout` for its acknowledgement.
    ///
    /// The online flag is cleared before the probe is sent, so an earlier
    /// acknowledgement cannot satisfy this wait. No retry on timeout.
    pub fn wait_for_hub_online(&self, timeout: Duration) -> Result<bool> {
        self.shared.send_probe()?;
        let online = self.shared.pulse.wait_online(timeout);
        if !online {
            debug!(
                timeout_ms = timeout.as_millis() as u64,
                "no pulse acknowledgement before timeout"
            );
        }
        Ok(online)
    }

    pub fn pulse(&self) -> &PulseHandshake {
        &self.shared.pulse
    }

    pub fn discovery(&self) -> &DiscoveryGate {
        &self.shared.discovery
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.shared.clock)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    pub fn session_state(&self) -> OpenState {
        *self
            .shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn stats(&self) -> BridgeStats {
        let c = &self.shared.counters;
        BridgeStats {
            frames_received: c.frames_received.load(Ordering::Relaxed),
            frames_sent: c.frames_sent.load(Ordering::Relaxed),
            inbound_dropped: c.inbound_dropped.load(Ordering::Relaxed),
            send_failures: c.send_failures.load(Ordering::Relaxed),
            protocol_errors: c.protocol_errors.load(Ordering::Relaxed),
            unexpected_responses: c.unexpected_responses.load(Ordering::Relaxed),
            discarded_at_close: c.discarded_at_close.load(Ordering::Relaxed),
        }
    }

    /// Recent traffic, oldest first.
    pub fn recent_messages(&self) -> Vec<MessageSummary> {
        self.shared.history.snapshot()
    }

    /// Human-readable state: queue depths, counters and recent traffic.
    pub fn dump(&self) -> String {
        let shared = &self.shared;
        let stats = self.stats();
        let history = shared.history.snapshot();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "link: {} ({})",
            shared.link.name(),
            if shared.is_closed() { "closed" } else { "open" }
        );
        let _ = writeln!(out, "session: {:?}", self.session_state());
        let _ = writeln!(
            out,
            "hub online: {}, discovery complete: {}",
            shared.pulse.is_back_online(),
            shared.discovery.is_complete()
        );
        let _ = writeln!(
            out,
            "inbound queue: {}/{}",
            shared.inbound.size(),
            shared.inbound.capacity()
        );
        let _ = writeln!(
            out,
            "outbound queue: {}/{}",
            shared.outbound.size(),
            shared.outbound.capacity()
        );
        let _ = writeln!(
            out,
            "frames: {} received, {} sent, {} dropped inbound, {} send failures",
            stats.frames_received, stats.frames_sent, stats.inbound_dropped, stats.send_failures
        );
        let _ = writeln!(
            out,
            "errors: {} protocol, {} unexpected responses",
            stats.protocol_errors, stats.unexpected_responses
        );
        let _ = writeln!(out, "last {} messages:", history.len());
        for summary in &history {
            let _ = writeln!(out, "  {summary}");
        }
        out
    }

    /// Stop all workers and close the link. Idempotent.
    ///
    /// Frames still queued in either direction are discarded and counted.
    pub fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(link = shared.link.name(), "closing bridge");

        // Dropping the sender wakes the StateMonitor.
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        shared.inbound.close();
        shared.outbound.close();
        shared.link.close();
        shared.set_session(OpenState::Closed);

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for worker in workers {
            // A callback may drop the last bridge handle from a worker thread.
            if worker.thread().id() == current {
                continue;
            }
            let name = worker.thread().name().map(str::to_owned);
            if worker.join().is_err() {
                error!(thread = ?name, "bridge worker panicked");
            }
        }
        // A pulse ack handled during shutdown may have reopened the session.
        shared.set_session(OpenState::Closed);

        let discarded = (shared.inbound.drain().len() + shared.outbound.drain().len()) as u64;
        shared
            .counters
            .discarded_at_close
            .fetch_add(discarded, Ordering::Relaxed);
        if discarded > 0 {
            info!(discarded, "discarded queued frames at close");
        }
        debug!("bridge closed");
    }
}

impl Drop for ConnectionBridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ConnectionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBridge")
            .field("link", &self.shared.link.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn enqueue(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }
        if frame.is_empty() {
            return Err(FrameError::EmptyPayload.into());
        }
        if frame.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.len(),
                max: self.config.max_payload_size,
            }
            .into());
        }
        self.outbound.push(frame).map_err(|_| {
            if self.outbound.is_closed() {
                BridgeError::Closed
            } else {
                warn!(
                    capacity = self.outbound.capacity(),
                    "outbound queue full; request refused"
                );
                BridgeError::QueueFull {
                    queue: self.outbound.name(),
                    capacity: self.outbound.capacity(),
                }
            }
        })
    }

    /// Arm the liveness state and queue a probe. Returns its transaction.
    fn send_probe(&self) -> Result<u8> {
        let transaction = self.pulse.arm();
        let header = AppHeader::request(PULSE, transaction, PULSE_PROBE);
        self.enqueue(Frame::new(Bytes::copy_from_slice(&header.to_bytes())))?;
        debug!(transaction, "pulse probe queued");
        Ok(transaction)
    }

    fn start_probe(&self, reason: &'static str) -> Option<Probe> {
        match self.send_probe() {
            Ok(transaction) => Some(Probe {
                transaction,
                deadline: Instant::now() + self.pulse_config.timeout,
                reason,
            }),
            Err(err) => {
                warn!(error = %err, reason, "could not send pulse probe");
                None
            }
        }
    }

    /// Record the session state and push it to every live client.
    fn set_session(&self, state: OpenState) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = state;
        let handlers: Vec<_> = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for handler in handlers {
            handler.set_open_state(state);
        }
    }

    /// Tell the client owning an unsent request that it will get no answer.
    fn fail_request(&self, payload: &[u8], err: BridgeError) {
        let Ok(header) = AppHeader::decode(payload) else {
            return;
        };
        if header.kind != MessageKind::Request || header.handle == PULSE {
            return;
        }
        let handler = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&header.handle)
            .and_then(Weak::upgrade);
        if let Some(handler) = handler {
            handler.on_send_failed(header.transaction, err);
        }
    }

    /// Session bookkeeping shared by reset and recovery.
    fn apply_session_state(&self, event: LinkEvent) {
        let state = match event {
            LinkEvent::Reset => {
                warn!("hub reset; closing client sessions");
                self.discovery.reset();
                OpenState::Closed
            }
            LinkEvent::Recovered => {
                info!("hub link recovered; waiting for pulse acknowledgement");
                OpenState::Opening
            }
        };
        self.set_session(state);
    }

    fn accept_inbound(&self, wire: &[u8]) {
        let frame = match parse_frame(wire, self.config.max_payload_size) {
            Ok(frame) if !frame.is_empty() => frame,
            Ok(_) => {
                warn!("dropping empty frame");
                bump(&self.counters.protocol_errors);
                return;
            }
            Err(err) => {
                warn!(error = %err, size = wire.len(), "dropping malformed frame");
                bump(&self.counters.protocol_errors);
                return;
            }
        };
        bump(&self.counters.frames_received);
        trace!(size = frame.len(), "frame received");

        let item = InboundFrame {
            payload: frame.into_payload(),
            received_ns: self.clock.now_ns(),
        };
        let dropped = match self.config.inbound_overflow {
            InboundOverflow::DropOldest => self.inbound.push_evicting(item),
            InboundOverflow::Reject => self.inbound.push(item).err(),
        };
        if let Some(dropped) = dropped {
            if self.inbound.is_closed() {
                return;
            }
            bump(&self.counters.inbound_dropped);
            warn!(
                capacity = self.inbound.capacity(),
                policy = ?self.config.inbound_overflow,
                size = dropped.payload.len(),
                "inbound queue full; frame dropped"
            );
        }
    }

    fn dispatch(&self, item: InboundFrame, acks: &Sender<u8>) {
        let started = Instant::now();
        let mut summary =
            MessageSummary::from_raw(Direction::Inbound, &item.payload, item.received_ns);

        match AppHeader::decode(&item.payload) {
            Ok(header) => {
                if let Err(err) = self.route(&header, &item.payload, acks) {
                    summary.error = Some(err.to_string());
                }
            }
            Err(err) => {
                warn!(error = %err, size = item.payload.len(), "undecodable inbound message");
                bump(&self.counters.protocol_errors);
            }
        }

        let elapsed = started.elapsed();
        summary.processing_ns = nanos(elapsed);
        if elapsed > self.config.slow_handler_threshold {
            warn!(
                handle = ?summary.handle,
                command = summary.command,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow message handling"
            );
        }
        self.history.push_evicting(summary);
    }

    fn route(&self, header: &AppHeader, payload: &Bytes, acks: &Sender<u8>) -> Result<()> {
        match header.kind {
            MessageKind::Response if header.handle == PULSE => {
                trace!(transaction = header.transaction, "pulse acknowledgement");
                let _ = acks.send(header.transaction);
                Ok(())
            }
            MessageKind::Response => {
                let handler = self
                    .routes
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&header.handle)
                    .and_then(Weak::upgrade);
                let Some(handler) = handler else {
                    bump(&self.counters.unexpected_responses);
                    warn!(handle = header.handle, "response for unregistered handle");
                    return Err(BridgeError::UnexpectedResponse {
                        handle: header.handle,
                        command: header.command,
                    });
                };
                handler.on_response(header, payload).map_err(|err| {
                    match &err {
                        BridgeError::UnexpectedResponse { .. } => {
                            bump(&self.counters.unexpected_responses)
                        }
                        _ => bump(&self.counters.protocol_errors),
                    }
                    warn!(
                        error = %err,
                        handle = header.handle,
                        transaction = header.transaction,
                        "response rejected"
                    );
                    err
                })
            }
            MessageKind::Notification | MessageKind::Request => {
                self.callback.on_message(header, payload);
                Ok(())
            }
        }
    }
}

fn run_listener(shared: &Shared) {
    while !shared.is_closed() {
        match shared.link.recv(shared.config.poll_interval) {
            Ok(Some(wire)) => shared.accept_inbound(&wire),
            Ok(None) => {}
            Err(TransportError::Closed) => {
                if !shared.is_closed() {
                    warn!(link = shared.link.name(), "link closed; listener stopping");
                }
                break;
            }
            Err(TransportError::Rejected(reason)) => {
                warn!(%reason, "link rejected inbound bytes");
                bump(&shared.counters.protocol_errors);
            }
            Err(err) => {
                error!(error = %err, "link receive failed");
                thread::sleep(shared.config.poll_interval);
            }
        }
    }
    debug!("listener stopped");
}

fn run_handler(shared: &Shared, acks: &Sender<u8>) {
    while let Some(item) = shared.inbound.pop_blocking() {
        shared.dispatch(item, acks);
    }
    debug!("handler stopped");
}

fn run_sender(shared: &Shared) {
    let mut wire = BytesMut::new();
    while let Some(frame) = shared.outbound.pop_blocking() {
        let started = Instant::now();
        let mut summary =
            MessageSummary::from_raw(Direction::Outbound, frame.payload(), shared.clock.now_ns());

        wire.clear();
        let result = encode_frame(frame.payload(), &mut wire)
            .map_err(BridgeError::from)
            .and_then(|()| shared.link.send(&wire).map_err(BridgeError::from));
        match result {
            Ok(()) => {
                bump(&shared.counters.frames_sent);
                trace!(size = frame.len(), "frame sent");
            }
            Err(err) => {
                bump(&shared.counters.send_failures);
                warn!(error = %err, size = frame.len(), "send failed; frame dropped");
                summary.error = Some(err.to_string());
                shared.fail_request(frame.payload(), err);
            }
        }

        summary.processing_ns = nanos(started.elapsed());
        shared.history.push_evicting(summary);
    }
    debug!("sender stopped");
}

enum Wake {
    Shutdown,
    Event(LinkEvent),
    EventsEnded,
    Ack(u8),
    ProbeExpired,
}

fn run_state_monitor(
    shared: &Shared,
    events: Receiver<LinkEvent>,
    acks: Receiver<u8>,
    shutdown: Receiver<()>,
) {
    let mut events_open = true;
    let mut probe = if shared.config.probe_on_start {
        shared.start_probe("startup")
    } else {
        None
    };
    // Set from a reset until the hub answers a probe.
    let mut recovering_since: Option<Instant> = None;

    loop {
        let events_rx = if events_open { events.clone() } else { never() };
        let deadline = match &probe {
            Some(probe) => at(probe.deadline),
            None => never(),
        };

        let wake = select! {
            recv(shutdown) -> _ => Wake::Shutdown,
            recv(events_rx) -> event => match event {
                Ok(event) => Wake::Event(event),
                Err(_) => Wake::EventsEnded,
            },
            recv(acks) -> ack => match ack {
                Ok(transaction) => Wake::Ack(transaction),
                Err(_) => Wake::Shutdown,
            },
            recv(deadline) -> _ => Wake::ProbeExpired,
        };

        match wake {
            Wake::Shutdown => break,
            Wake::Event(event) => {
                shared.apply_session_state(event);
                match event {
                    LinkEvent::Reset => {
                        recovering_since = Some(Instant::now());
                        probe = None;
                    }
                    LinkEvent::Recovered => {
                        recovering_since.get_or_insert_with(Instant::now);
                        probe = shared.start_probe("recovery");
                    }
                }
            }
            Wake::EventsEnded => {
                debug!("link event stream ended");
                events_open = false;
            }
            Wake::Ack(transaction) => {
                if shared.pulse.notify_back_online(transaction) {
                    probe = None;
                    on_pulse_ack(shared, transaction, recovering_since.take());
                } else {
                    debug!(transaction, "stale pulse acknowledgement ignored");
                }
            }
            Wake::ProbeExpired => {
                if let Some(expired) = probe.take() {
                    warn!(
                        reason = expired.reason,
                        transaction = expired.transaction,
                        timeout_ms = shared.pulse_config.timeout.as_millis() as u64,
                        "hub did not answer pulse probe"
                    );
                }
            }
        }
    }
    debug!("state monitor stopped");
}

fn on_pulse_ack(shared: &Shared, transaction: u8, recovering_since: Option<Instant>) {
    shared.discovery.mark_complete();
    match recovering_since {
        Some(since) => {
            let recovery = since.elapsed();
            shared.set_session(OpenState::Opened);
            info!(recovery_ms = recovery.as_millis() as u64, "hub back online");
            shared.callback.on_hub_restarted(recovery);
        }
        None => debug!(transaction, "hub confirmed responsive"),
    }
}
