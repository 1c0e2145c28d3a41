use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use hublink_bridge::HubConfig;
use hublink_frame::{FrameConfig, StreamLink};
use hublink_transport::TransportError;

use crate::exit::{bridge_error, transport_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod pulse;
pub mod sim;
pub mod timesync;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a simulated hub on a Unix socket.
    Sim(SimArgs),
    /// Measure round-trip time and clock offset against a hub.
    Timesync(TimesyncArgs),
    /// Probe a hub and wait for it to answer.
    Pulse(PulseArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sim(args) => sim::run(args, format),
        Command::Timesync(args) => timesync::run(args, format),
        Command::Pulse(args) => pulse::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Hub clock offset from the host clock, in nanoseconds.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub offset_ns: i64,
    /// Exit after serving N host connections.
    #[arg(long)]
    pub connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Socket path of the hub.
    pub path: PathBuf,
    /// How long to keep retrying the connection (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// JSON configuration file (bridge, timesync, pulse sections).
    #[arg(long, value_name = "FILE", env = "HUBLINK_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TimesyncArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Number of GetTime exchanges (overrides the config file).
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PulseArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// How long to wait for the acknowledgement (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn load_config(path: Option<&Path>) -> CliResult<HubConfig> {
    match path {
        Some(path) => HubConfig::from_path(path).map_err(|err| bridge_error("config", err)),
        None => Ok(HubConfig::default()),
    }
}

/// Connect to the hub socket, retrying while it is not listening yet.
pub(crate) fn connect_with_timeout(
    path: &Path,
    config: FrameConfig,
    timeout: Duration,
) -> CliResult<StreamLink> {
    let start = Instant::now();
    loop {
        match StreamLink::connect(path, config.clone()) {
            Ok(link) => return Ok(link),
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(transport_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect timed out after {timeout:?}"),
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn is_retryable_connect_error(err: &TransportError) -> bool {
    match err {
        TransportError::Connect { source, .. } => {
            source.kind() == std::io::ErrorKind::NotFound
                || source.kind() == std::io::ErrorKind::ConnectionRefused
        }
        _ => false,
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
