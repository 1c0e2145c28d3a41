mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use common::{next_request, quiet_config, response, wait_until, Hub};
use crossbeam_channel::{bounded, Receiver, Sender};
use hublink_bridge::{
    BridgeCallback, BridgeConfig, BridgeError, ConnectionBridge, OpenState, PulseConfig,
    RequestResponseClient, ResponseHandler,
};
use hublink_frame::{AppHeader, FIRST_SERVICE, PULSE};
use hublink_transport::{LinkEvent, LoopbackLink};

#[test]
fn acknowledged_probe_wakes_every_waiter() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, quiet_config()).unwrap();
    let _hub = Hub::spawn(peer, |header, _| {
        (header.handle == PULSE).then(|| response(header, &[]))
    });

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || bridge.pulse().wait_online(Duration::from_secs(5)))
        })
        .collect();
    thread::sleep(Duration::from_millis(20));

    assert!(bridge.wait_for_hub_online(Duration::from_secs(2)).unwrap());
    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
    assert!(bridge.discovery().is_complete());
}

#[test]
fn late_ack_is_still_observed() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, quiet_config()).unwrap();

    assert!(!bridge.wait_for_hub_online(Duration::from_millis(50)).unwrap());
    assert!(!bridge.pulse().is_back_online());

    let (probe, _) = next_request(&peer, Duration::from_secs(1)).unwrap();
    assert_eq!(probe.handle, PULSE);
    peer.send(response(&probe, &[])).unwrap();

    assert!(bridge.pulse().wait_online(Duration::from_secs(2)));
}

#[test]
fn new_probe_is_not_satisfied_by_earlier_ack() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, quiet_config()).unwrap();

    // First probe answered.
    let hub = Hub::spawn(peer, |header, _| Some(response(header, &[])));
    assert!(bridge.wait_for_hub_online(Duration::from_secs(2)).unwrap());
    drop(hub);

    // The hub goes quiet; the next probe must not see the old flag.
    assert!(!bridge.wait_for_hub_online(Duration::from_millis(50)).unwrap());
}

#[derive(Default)]
struct RestartRecorder {
    restarts: Mutex<Vec<Duration>>,
}

impl BridgeCallback for RestartRecorder {
    fn on_message(&self, _header: &AppHeader, _payload: &Bytes) {}

    fn on_hub_restarted(&self, recovery: Duration) {
        self.restarts.lock().unwrap().push(recovery);
    }
}

#[test]
fn reset_closes_clients_and_recovery_reopens_them() {
    let (link, peer) = LoopbackLink::pair();
    let recorder = Arc::new(RestartRecorder::default());
    let bridge = ConnectionBridge::builder(link)
        .config(BridgeConfig {
            probe_on_start: true,
            ..quiet_config()
        })
        .callback(Arc::clone(&recorder) as Arc<dyn BridgeCallback>)
        .start()
        .unwrap();
    let client = RequestResponseClient::register(&bridge, FIRST_SERVICE, "echo", None).unwrap();

    // Start-up probe completes discovery without counting as a restart.
    let (probe, _) = next_request(&peer, Duration::from_secs(1)).unwrap();
    peer.send(response(&probe, &[])).unwrap();
    assert!(wait_until(Duration::from_secs(2), || bridge
        .discovery()
        .is_complete()));
    assert!(recorder.restarts.lock().unwrap().is_empty());

    peer.signal(LinkEvent::Reset).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        client.open_state() == OpenState::Closed
    }));
    assert!(!bridge.discovery().is_complete());
    assert!(matches!(
        client.send_and_wait(1, &[], Duration::from_millis(50)),
        Err(BridgeError::NotReady)
    ));

    peer.signal(LinkEvent::Recovered).unwrap();
    let (probe, _) = next_request(&peer, Duration::from_secs(1)).unwrap();
    assert_eq!(probe.handle, PULSE);
    assert_eq!(client.open_state(), OpenState::Opening);
    peer.send(response(&probe, &[])).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        client.open_state() == OpenState::Opened
    }));
    assert!(bridge.discovery().is_complete());
    assert!(bridge.pulse().is_back_online());
    assert_eq!(recorder.restarts.lock().unwrap().len(), 1);
}

#[test]
fn unanswered_recovery_probe_leaves_hub_offline() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::builder(link)
        .config(quiet_config())
        .pulse(PulseConfig {
            timeout: Duration::from_millis(30),
        })
        .start()
        .unwrap();

    peer.signal(LinkEvent::Reset).unwrap();
    peer.signal(LinkEvent::Recovered).unwrap();
    assert!(next_request(&peer, Duration::from_secs(1)).is_some());

    thread::sleep(Duration::from_millis(100));
    assert!(peer.try_recv().is_none(), "probe must not be retried");
    assert!(!bridge.pulse().is_back_online());
    assert_eq!(bridge.session_state(), OpenState::Opening);
}

/// Records session changes; the move to `Opened` stalls until the gate opens.
struct StalledReopen {
    states: Mutex<Vec<OpenState>>,
    reopening: Sender<()>,
    gate: Receiver<()>,
}

impl StalledReopen {
    fn last(&self) -> Option<OpenState> {
        self.states.lock().unwrap().last().copied()
    }
}

impl ResponseHandler for StalledReopen {
    fn on_response(&self, _header: &AppHeader, _payload: &Bytes) -> hublink_bridge::Result<()> {
        Ok(())
    }

    fn set_open_state(&self, state: OpenState) {
        if state == OpenState::Opened {
            let _ = self.reopening.send(());
            let _ = self.gate.recv_timeout(Duration::from_secs(5));
        }
        self.states.lock().unwrap().push(state);
    }
}

#[test]
fn recovery_finishing_during_close_leaves_sessions_closed() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, quiet_config()).unwrap();
    let (reopening_tx, reopening) = bounded(1);
    let (open, gate) = bounded(0);
    let handler = Arc::new(StalledReopen {
        states: Mutex::new(Vec::new()),
        reopening: reopening_tx,
        gate,
    });
    bridge.register(FIRST_SERVICE, &handler).unwrap();

    peer.signal(LinkEvent::Reset).unwrap();
    peer.signal(LinkEvent::Recovered).unwrap();
    let (probe, _) = next_request(&peer, Duration::from_secs(1)).unwrap();
    peer.send(response(&probe, &[])).unwrap();

    // The StateMonitor is now inside the Opened notification.
    reopening.recv_timeout(Duration::from_secs(2)).unwrap();

    let releaser = {
        let handler = Arc::clone(&handler);
        thread::spawn(move || {
            assert!(wait_until(Duration::from_secs(2), || {
                handler.last() == Some(OpenState::Closed)
            }));
            open.send(()).unwrap();
        })
    };
    bridge.close();
    releaser.join().unwrap();

    assert_eq!(handler.last(), Some(OpenState::Closed));
    assert_eq!(bridge.session_state(), OpenState::Closed);
}
