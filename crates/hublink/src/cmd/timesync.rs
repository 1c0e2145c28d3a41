use hublink_bridge::{format_nanos, AppErrorCode, HubContext, TimesyncResult};
use hublink_frame::FrameConfig;
use serde::Serialize;

use crate::cmd::{connect_with_timeout, load_config, parse_duration, TimesyncArgs};
use crate::exit::{app_error_code, bridge_error, CliResult};
use crate::output::{millis, print_report, OutputFormat, Report};

#[derive(Serialize)]
struct TimesyncReport {
    socket: String,
    measurements: usize,
    error: AppErrorCode,
    rtt_ns: Option<u64>,
    offset_ns: Option<i64>,
    hub_online: bool,
}

impl TimesyncReport {
    fn new(socket: String, measurements: usize, hub_online: bool, result: TimesyncResult) -> Self {
        let sampled = result.rtt().is_some();
        Self {
            socket,
            measurements,
            error: result.error,
            rtt_ns: sampled.then_some(result.rtt_ns),
            offset_ns: sampled.then_some(result.offset_ns),
            hub_online,
        }
    }
}

impl Report for TimesyncReport {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let unavailable = || "unavailable".to_string();
        vec![
            ("Socket", self.socket.clone()),
            ("Hub online", self.hub_online.to_string()),
            ("Measurements", self.measurements.to_string()),
            ("Result", self.error.to_string()),
            ("Round trip", self.rtt_ns.map(format_nanos).unwrap_or_else(unavailable)),
            ("Clock offset", self.offset_ns.map(millis).unwrap_or_else(unavailable)),
        ]
    }
}

pub fn run(args: TimesyncArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = load_config(args.connect.config.as_deref())?;
    if let Some(count) = args.count {
        config.timesync.measurement_count = count;
    }
    let measurements = config.timesync.measurement_count;
    let discovery_timeout = config.timesync.discovery_timeout;

    let connect_timeout = parse_duration(&args.connect.connect_timeout)?;
    let link = connect_with_timeout(&args.connect.path, FrameConfig::default(), connect_timeout)?;
    let context = HubContext::start(link, config).map_err(|err| bridge_error("bridge", err))?;

    // The start-up probe completes discovery; timesync waits on it too.
    let hub_online = context.bridge().discovery().wait_complete(discovery_timeout);
    let result = context.run_time_sync();
    tracing::debug!(bridge = %context.dump(), "bridge state after timesync");
    context.close();

    let report = TimesyncReport::new(
        args.connect.path.display().to_string(),
        measurements,
        hub_online,
        result,
    );
    print_report(&report, format);
    Ok(app_error_code(result.error))
}
