use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hublink_bridge::{HubResponder, MonotonicClock};
use hublink_frame::{FrameConfig, StreamLink};
use hublink_transport::UnixDomainSocket;
use serde::Serialize;

use crate::cmd::SimArgs;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{millis, print_report, OutputFormat, Report};

const SERVE_POLL: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct SimReport {
    socket: String,
    offset_ns: i64,
    connections: usize,
    responses: u64,
}

impl Report for SimReport {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Socket", self.socket.clone()),
            ("Hub offset", millis(self.offset_ns)),
            ("Connections", self.connections.to_string()),
            ("Responses", self.responses.to_string()),
        ]
    }
}

pub fn run(args: SimArgs, format: OutputFormat) -> CliResult<i32> {
    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let responder = HubResponder::new(Arc::new(MonotonicClock::new()), args.offset_ns);

    // Set by Ctrl-C; `serve` returns once it sees it.
    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(stop.clone())?;

    let mut report = SimReport {
        socket: args.path.display().to_string(),
        offset_ns: args.offset_ns,
        connections: 0,
        responses: 0,
    };

    while !stop.load(Ordering::SeqCst) {
        if args.connections.is_some_and(|limit| report.connections >= limit) {
            break;
        }
        let stream = socket
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let link = StreamLink::new(stream, FrameConfig::default())
            .map_err(|err| transport_error("link setup failed", err))?;
        report.connections += 1;
        tracing::info!(connection = report.connections, "host connected");

        match responder.serve(&link, &stop, SERVE_POLL) {
            Ok(answered) => {
                report.responses += answered;
                tracing::info!(answered, "host disconnected");
            }
            // One broken host connection does not take the hub down.
            Err(err) => tracing::warn!(error = %err, "connection ended with error"),
        }
    }

    print_report(&report, format);
    Ok(SUCCESS)
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
