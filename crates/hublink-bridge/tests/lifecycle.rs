mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use common::{notification, quiet_config, wait_until};
use crossbeam_channel::{bounded, Receiver, Sender};
use hublink_bridge::{
    BridgeCallback, BridgeConfig, BridgeError, ConnectionBridge, InboundOverflow,
};
use hublink_frame::{AppHeader, Frame, FIRST_SERVICE};
use hublink_transport::{LinkEvent, LoopbackLink, Result as TransportResult, TransportLink};

/// Loopback link whose sends take a while, so the outbound queue backs up.
struct SlowLink {
    inner: LoopbackLink,
    delay: Duration,
}

impl TransportLink for SlowLink {
    fn send(&self, frame: &[u8]) -> TransportResult<()> {
        thread::sleep(self.delay);
        self.inner.send(frame)
    }

    fn recv(&self, timeout: Duration) -> TransportResult<Option<Bytes>> {
        self.inner.recv(timeout)
    }

    fn events(&self) -> Receiver<LinkEvent> {
        self.inner.events()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn name(&self) -> &'static str {
        "slow-loopback"
    }
}

/// Callback that records commands, optionally blocking on a gate first.
struct Recorder {
    commands: Mutex<Vec<u16>>,
    gate: Option<Receiver<()>>,
}

impl BridgeCallback for Recorder {
    fn on_message(&self, header: &AppHeader, _payload: &Bytes) {
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        self.commands.lock().unwrap().push(header.command);
    }
}

fn gated_recorder() -> (Arc<Recorder>, Sender<()>) {
    let (open, gate) = bounded(0);
    let recorder = Arc::new(Recorder {
        commands: Mutex::new(Vec::new()),
        gate: Some(gate),
    });
    (recorder, open)
}

fn outbound_frame(command: u16) -> Frame {
    Frame::new(AppHeader::notification(FIRST_SERVICE, command).to_bytes().to_vec())
}

#[test]
fn close_with_both_queues_loaded_terminates() {
    let (inner, peer) = LoopbackLink::pair();
    let link = SlowLink {
        inner,
        delay: Duration::from_millis(50),
    };
    let (recorder, open) = gated_recorder();
    let bridge = ConnectionBridge::builder(link)
        .config(quiet_config())
        .callback(Arc::clone(&recorder) as Arc<dyn BridgeCallback>)
        .start()
        .unwrap();

    for command in 0..20 {
        peer.send(notification(FIRST_SERVICE, command)).unwrap();
        bridge.send(outbound_frame(command)).unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || {
        bridge.stats().frames_received == 20
    }));

    // Release the blocked callback; the slow link keeps the outbound queue loaded.
    drop(open);
    let started = Instant::now();
    bridge.close();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(bridge.is_closed());

    let stats = bridge.stats();
    assert!(stats.discarded_at_close > 0);
    assert!(stats.frames_sent < 20);
    assert!(matches!(
        bridge.send(outbound_frame(99)),
        Err(BridgeError::Closed)
    ));
}

#[test]
fn full_outbound_queue_refuses_without_blocking() {
    let (inner, _peer) = LoopbackLink::pair();
    let link = SlowLink {
        inner,
        delay: Duration::from_millis(200),
    };
    let bridge = ConnectionBridge::start(
        link,
        BridgeConfig {
            outbound_capacity: 2,
            ..quiet_config()
        },
    )
    .unwrap();

    let mut refused = 0;
    for command in 0..6 {
        let started = Instant::now();
        match bridge.send(outbound_frame(command)) {
            Ok(()) => {}
            Err(BridgeError::QueueFull { queue, capacity }) => {
                assert_eq!((queue, capacity), ("outbound", 2));
                refused += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }
    // At most one frame is in the Sender's hands, two are queued.
    assert!(refused >= 3);
}

#[test]
fn inbound_overflow_drops_oldest_by_default() {
    let (link, peer) = LoopbackLink::pair();
    let (recorder, open) = gated_recorder();
    let bridge = ConnectionBridge::builder(link)
        .config(BridgeConfig {
            inbound_capacity: 4,
            ..quiet_config()
        })
        .callback(Arc::clone(&recorder) as Arc<dyn BridgeCallback>)
        .start()
        .unwrap();

    // The Handler takes the first frame and blocks on the gate.
    peer.send(notification(FIRST_SERVICE, 0)).unwrap();
    thread::sleep(Duration::from_millis(50));
    for command in 1..10 {
        peer.send(notification(FIRST_SERVICE, command)).unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || {
        bridge.stats().frames_received == 10
    }));
    assert_eq!(bridge.stats().inbound_dropped, 5);

    for _ in 0..5 {
        open.send(()).unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || {
        recorder.commands.lock().unwrap().len() == 5
    }));
    assert_eq!(*recorder.commands.lock().unwrap(), vec![0, 6, 7, 8, 9]);
}

#[test]
fn inbound_overflow_can_reject_newest() {
    let (link, peer) = LoopbackLink::pair();
    let (recorder, open) = gated_recorder();
    let bridge = ConnectionBridge::builder(link)
        .config(BridgeConfig {
            inbound_capacity: 4,
            inbound_overflow: InboundOverflow::Reject,
            ..quiet_config()
        })
        .callback(Arc::clone(&recorder) as Arc<dyn BridgeCallback>)
        .start()
        .unwrap();

    peer.send(notification(FIRST_SERVICE, 0)).unwrap();
    thread::sleep(Duration::from_millis(50));
    for command in 1..10 {
        peer.send(notification(FIRST_SERVICE, command)).unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || {
        bridge.stats().frames_received == 10
    }));
    assert_eq!(bridge.stats().inbound_dropped, 5);

    for _ in 0..5 {
        open.send(()).unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || {
        recorder.commands.lock().unwrap().len() == 5
    }));
    assert_eq!(*recorder.commands.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn dropping_the_last_handle_closes_the_bridge() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, quiet_config()).unwrap();
    drop(bridge);
    assert!(peer.send(notification(FIRST_SERVICE, 1)).is_err());
}
