use std::time::Instant;

use hublink_bridge::{BridgeConfig, ConnectionBridge};
use hublink_frame::FrameConfig;
use serde::Serialize;

use crate::cmd::{connect_with_timeout, load_config, parse_duration, PulseArgs};
use crate::exit::{bridge_error, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_report, OutputFormat, Report};

#[derive(Serialize)]
struct PulseReport {
    socket: String,
    online: bool,
    latency_ms: Option<f64>,
}

impl Report for PulseReport {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Socket", self.socket.clone()),
            ("Hub online", self.online.to_string()),
            (
                "Latency",
                self.latency_ms
                    .map(|ms| format!("{ms:.2}ms"))
                    .unwrap_or_else(|| "unavailable".to_string()),
            ),
        ]
    }
}

pub fn run(args: PulseArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(args.connect.config.as_deref())?;
    let timeout = parse_duration(&args.timeout)?;
    let connect_timeout = parse_duration(&args.connect.connect_timeout)?;

    let link = connect_with_timeout(&args.connect.path, FrameConfig::default(), connect_timeout)?;
    // This command sends the only probe itself.
    let bridge = ConnectionBridge::builder(link)
        .config(BridgeConfig {
            probe_on_start: false,
            ..config.bridge
        })
        .pulse(config.pulse)
        .start()
        .map_err(|err| bridge_error("bridge", err))?;

    let started = Instant::now();
    let online = bridge
        .wait_for_hub_online(timeout)
        .map_err(|err| bridge_error("probe failed", err))?;
    let latency_ms =
        online.then(|| (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0);
    bridge.close();

    print_report(
        &PulseReport {
            socket: args.connect.path.display().to_string(),
            online,
            latency_ms,
        },
        format,
    );
    Ok(if online { SUCCESS } else { TIMEOUT })
}
