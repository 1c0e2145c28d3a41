mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{next_request, quiet_config, response, Hub};
use hublink_bridge::{
    AppErrorCode, BridgeConfig, Clock, ConnectionBridge, HubContext, ManualClock, TimesyncConfig,
    TimesyncResult, GET_TIME, PULSE_PROBE,
};
use hublink_frame::{AppHeader, PULSE, TIMESYNC};
use hublink_transport::LoopbackLink;

const MS: u64 = 1_000_000;

fn probing_config() -> BridgeConfig {
    BridgeConfig {
        probe_on_start: true,
        ..quiet_config()
    }
}

fn timesync_config(measurement_count: usize) -> TimesyncConfig {
    TimesyncConfig {
        measurement_count,
        response_timeout: Duration::from_millis(200),
        discovery_timeout: Duration::from_secs(2),
    }
}

fn is_pulse_probe(header: &AppHeader) -> bool {
    header.handle == PULSE && header.command == PULSE_PROBE
}

fn is_get_time(header: &AppHeader) -> bool {
    header.handle == TIMESYNC && header.command == GET_TIME
}

/// Run one time sync against a hub that answers GetTime exchange `i` after
/// `script[i].0` of round trip with its clock `script[i].1` ahead.
fn run_scripted(script: Vec<(u64, u64)>) -> (TimesyncResult, usize, HubContext) {
    let clock = Arc::new(ManualClock::new(1_000 * MS));
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::builder(link)
        .config(probing_config())
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .start()
        .unwrap();

    let count = script.len();
    let served = Arc::new(AtomicUsize::new(0));
    let _hub = {
        let clock = Arc::clone(&clock);
        let served = Arc::clone(&served);
        Hub::spawn(peer, move |header, _| {
            if is_pulse_probe(header) {
                return Some(response(header, &[]));
            }
            if !is_get_time(header) {
                return None;
            }
            let (rtt, offset) = script[served.fetch_add(1, Ordering::SeqCst)];
            let hub_time = clock.now_ns() + rtt / 2 + offset;
            clock.advance(Duration::from_nanos(rtt));
            Some(response(header, &hub_time.to_le_bytes()))
        })
    };

    let context = HubContext::with_bridge(bridge, timesync_config(count)).unwrap();
    let result = context.run_time_sync();
    (result, served.load(Ordering::SeqCst), context)
}

#[test]
fn minimum_rtt_sample_sets_offset() {
    let (result, served, context) =
        run_scripted(vec![(50 * MS, 7 * MS), (10 * MS, 3 * MS), (30 * MS, 9 * MS)]);

    assert_eq!(result.error, AppErrorCode::None);
    assert_eq!(result.rtt_ns, 10 * MS);
    assert_eq!(result.offset_ns, (3 * MS) as i64);
    assert_eq!(served, 3);

    let hub_time = 2_000 * MS;
    assert_eq!(
        context.estimated_host_time_ns(hub_time),
        Some(hub_time - 3 * MS)
    );
}

#[test]
fn minimum_rtt_wins_in_any_arrival_order() {
    let orders = [
        vec![(10 * MS, 3 * MS), (50 * MS, 7 * MS), (30 * MS, 9 * MS)],
        vec![(30 * MS, 9 * MS), (50 * MS, 7 * MS), (10 * MS, 3 * MS)],
        vec![(50 * MS, 7 * MS), (30 * MS, 9 * MS), (10 * MS, 3 * MS)],
    ];
    for script in orders {
        let (result, served, _) = run_scripted(script.clone());
        assert_eq!(result.error, AppErrorCode::None, "order {script:?}");
        assert_eq!(result.rtt_ns, 10 * MS, "order {script:?}");
        assert_eq!(result.offset_ns, (3 * MS) as i64, "order {script:?}");
        assert_eq!(served, 3);
    }
}

#[test]
fn equal_rtt_keeps_the_earlier_offset() {
    let (result, _, _) =
        run_scripted(vec![(10 * MS, 3 * MS), (10 * MS, 8 * MS), (30 * MS, MS)]);

    assert_eq!(result.error, AppErrorCode::None);
    assert_eq!(result.rtt_ns, 10 * MS);
    assert_eq!(result.offset_ns, (3 * MS) as i64);
}

#[test]
fn failed_attempt_stops_the_run() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, probing_config()).unwrap();

    let requests = Arc::new(AtomicUsize::new(0));
    let _hub = {
        let requests = Arc::clone(&requests);
        Hub::spawn(peer, move |header, _| {
            if is_pulse_probe(header) {
                return Some(response(header, &[]));
            }
            // Answer the first GetTime only.
            if requests.fetch_add(1, Ordering::SeqCst) == 0 {
                Some(response(header, &42u64.to_le_bytes()))
            } else {
                None
            }
        })
    };

    let context = HubContext::with_bridge(bridge, timesync_config(5)).unwrap();
    let result = context.run_time_sync();

    assert_eq!(result.error, AppErrorCode::Timeout);
    // The sample from attempt 1 is kept for diagnostics.
    assert!(result.rtt().is_some());
    thread::sleep(Duration::from_millis(100));
    assert_eq!(requests.load(Ordering::SeqCst), 2);
    assert_eq!(context.estimated_host_time_ns(1_000), None);
}

#[test]
fn send_failure_stops_the_run_without_waiting() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, probing_config()).unwrap();
    let config = TimesyncConfig {
        response_timeout: Duration::from_millis(800),
        ..timesync_config(5)
    };
    let context = Arc::new(HubContext::with_bridge(Arc::clone(&bridge), config).unwrap());

    let run = {
        let context = Arc::clone(&context);
        thread::spawn(move || {
            let started = Instant::now();
            let result = context.run_time_sync();
            (result, started.elapsed())
        })
    };

    let (probe, _) = next_request(&peer, Duration::from_secs(2)).unwrap();
    assert!(is_pulse_probe(&probe));
    peer.send(response(&probe, &[])).unwrap();

    // Attempt 1 is answered; the link refuses everything from attempt 2 on.
    let (first, _) = next_request(&peer, Duration::from_secs(2)).unwrap();
    assert!(is_get_time(&first));
    peer.set_refuse_sends(true);
    peer.send(response(&first, &42u64.to_le_bytes())).unwrap();

    let (result, elapsed) = run.join().unwrap();
    assert_eq!(result.error, AppErrorCode::Unspecified);
    assert!(result.rtt().is_some());
    assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");

    // Attempts 3 to 5 were never handed to the link.
    assert_eq!(bridge.stats().send_failures, 1);
    assert!(next_request(&peer, Duration::from_millis(100)).is_none());
    assert_eq!(context.estimated_host_time_ns(1_000), None);
}

#[test]
fn concurrent_run_is_blocked_and_sends_nothing() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, quiet_config()).unwrap();
    let config = TimesyncConfig {
        discovery_timeout: Duration::from_millis(300),
        ..timesync_config(3)
    };
    let context = Arc::new(HubContext::with_bridge(bridge, config).unwrap());

    let first = {
        let context = Arc::clone(&context);
        thread::spawn(move || context.run_time_sync())
    };
    thread::sleep(Duration::from_millis(50));

    let second = context.run_time_sync();
    assert_eq!(second.error, AppErrorCode::Blocked);
    assert_eq!(context.timesync().last_result().error, AppErrorCode::Blocked);

    // Discovery never completes: the first run fails without sending.
    let first = first.join().unwrap();
    assert_eq!(first.error, AppErrorCode::NotReady);
    assert!(peer.try_recv().is_none());

    // Not stuck in the in-progress state.
    assert_eq!(context.timesync().last_result().error, AppErrorCode::NotReady);
}

#[test]
fn short_response_fails_with_invalid_length() {
    let (link, peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, probing_config()).unwrap();
    let _hub = Hub::spawn(peer, |header, _| {
        if is_pulse_probe(header) {
            return Some(response(header, &[]));
        }
        Some(response(header, &[0u8; 7]))
    });

    let context = HubContext::with_bridge(Arc::clone(&bridge), timesync_config(3)).unwrap();
    let result = context.run_time_sync();

    assert_eq!(result.error, AppErrorCode::InvalidLength);
    assert_eq!(result.rtt(), None);
    assert_eq!(bridge.stats().protocol_errors, 1);
}

#[test]
fn zero_measurements_is_a_configuration_error() {
    let (link, _peer) = LoopbackLink::pair();
    let bridge = ConnectionBridge::start(link, quiet_config()).unwrap();
    assert!(HubContext::with_bridge(bridge, timesync_config(0)).is_err());
}
