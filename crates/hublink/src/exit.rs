use std::fmt;
use std::io;

use hublink_bridge::{AppErrorCode, BridgeError};
use hublink_frame::FrameError;
use hublink_transport::TransportError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Transport(err) => transport_error(context, err),
        BridgeError::Frame(err) => frame_error(context, err),
        BridgeError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BridgeError::InvalidConfig(_) | BridgeError::ConfigRead { .. } | BridgeError::Json(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        BridgeError::InvalidLength { .. }
        | BridgeError::UnexpectedResponse { .. }
        | BridgeError::Status(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        BridgeError::Closed | BridgeError::NotReady => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Exit code for a result code reported by a protocol client.
pub fn app_error_code(code: AppErrorCode) -> i32 {
    match code {
        AppErrorCode::None => SUCCESS,
        AppErrorCode::Timeout => TIMEOUT,
        AppErrorCode::InvalidLength | AppErrorCode::InvalidCommand => DATA_INVALID,
        AppErrorCode::InvalidArg => USAGE,
        AppErrorCode::Oom | AppErrorCode::Unspecified => INTERNAL,
        _ => FAILURE,
    }
}
