use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Errors that can occur in bridge and client operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hublink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] hublink_frame::FrameError),

    /// The queue is at capacity. Backpressure, not a failure of the bridge.
    #[error("{queue} queue full (capacity {capacity})")]
    QueueFull {
        queue: &'static str,
        capacity: usize,
    },

    /// Allocation failed while building a request.
    #[error("out of memory building request")]
    OutOfMemory,

    /// A response did not have the exact expected size.
    #[error("response is {actual} bytes, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    /// A response arrived with no matching pending request.
    #[error("unexpected response (handle 0x{handle:02x}, command 0x{command:04x})")]
    UnexpectedResponse { handle: u8, command: u16 },

    /// The hub answered with a non-zero status.
    #[error("hub returned status {0}")]
    Status(u8),

    /// No response within the bounded wait.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A request is already in flight on this client.
    #[error("client busy: a request is already in flight")]
    Busy,

    /// A prerequisite step (discovery, session open) has not completed.
    #[error("hub not ready")]
    NotReady,

    /// The bridge or client session has been closed.
    #[error("bridge closed")]
    Closed,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Numeric outcome reported to protocol clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AppErrorCode {
    None = 0,
    InvalidCommand = 1,
    InvalidArg = 2,
    Busy = 3,
    Oom = 4,
    Unsupported = 5,
    Timeout = 6,
    Disabled = 7,
    RateLimited = 8,
    /// Operation already in progress.
    Blocked = 9,
    InvalidLength = 10,
    NotReady = 11,
    Unspecified = 0xFF,
}

impl AppErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AppErrorCode::None => "none",
            AppErrorCode::InvalidCommand => "invalid_command",
            AppErrorCode::InvalidArg => "invalid_arg",
            AppErrorCode::Busy => "busy",
            AppErrorCode::Oom => "oom",
            AppErrorCode::Unsupported => "unsupported",
            AppErrorCode::Timeout => "timeout",
            AppErrorCode::Disabled => "disabled",
            AppErrorCode::RateLimited => "rate_limited",
            AppErrorCode::Blocked => "blocked",
            AppErrorCode::InvalidLength => "invalid_length",
            AppErrorCode::NotReady => "not_ready",
            AppErrorCode::Unspecified => "unspecified",
        }
    }

    /// Decode a hub status byte; unknown values map to `Unspecified`.
    pub fn from_status(status: u8) -> Self {
        match status {
            0 => AppErrorCode::None,
            1 => AppErrorCode::InvalidCommand,
            2 => AppErrorCode::InvalidArg,
            3 => AppErrorCode::Busy,
            4 => AppErrorCode::Oom,
            5 => AppErrorCode::Unsupported,
            6 => AppErrorCode::Timeout,
            7 => AppErrorCode::Disabled,
            8 => AppErrorCode::RateLimited,
            9 => AppErrorCode::Blocked,
            10 => AppErrorCode::InvalidLength,
            11 => AppErrorCode::NotReady,
            _ => AppErrorCode::Unspecified,
        }
    }

    pub fn is_success(self) -> bool {
        self == AppErrorCode::None
    }
}

impl std::fmt::Display for AppErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&BridgeError> for AppErrorCode {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::QueueFull { .. } => AppErrorCode::RateLimited,
            BridgeError::OutOfMemory => AppErrorCode::Oom,
            BridgeError::InvalidLength { .. } => AppErrorCode::InvalidLength,
            BridgeError::Status(status) => AppErrorCode::from_status(*status),
            BridgeError::Timeout(_) => AppErrorCode::Timeout,
            BridgeError::Busy => AppErrorCode::Busy,
            BridgeError::NotReady => AppErrorCode::NotReady,
            BridgeError::Closed => AppErrorCode::Disabled,
            BridgeError::InvalidConfig(_) => AppErrorCode::InvalidArg,
            BridgeError::Transport(_)
            | BridgeError::Frame(_)
            | BridgeError::UnexpectedResponse { .. }
            | BridgeError::ConfigRead { .. }
            | BridgeError::Json(_)
            | BridgeError::Spawn { .. } => AppErrorCode::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_distinct_codes() {
        assert_eq!(AppErrorCode::from(&BridgeError::OutOfMemory), AppErrorCode::Oom);
        assert_eq!(
            AppErrorCode::from(&BridgeError::Timeout(Duration::from_secs(1))),
            AppErrorCode::Timeout
        );
        assert_eq!(
            AppErrorCode::from(&BridgeError::InvalidLength {
                expected: 14,
                actual: 13
            }),
            AppErrorCode::InvalidLength
        );
        assert_eq!(AppErrorCode::from(&BridgeError::Busy), AppErrorCode::Busy);
        assert_eq!(
            AppErrorCode::from(&BridgeError::Status(5)),
            AppErrorCode::Unsupported
        );
    }

    #[test]
    fn unknown_status_is_unspecified() {
        assert_eq!(AppErrorCode::from_status(0x42), AppErrorCode::Unspecified);
        assert!(AppErrorCode::from_status(0).is_success());
    }

    #[test]
    fn codes_serialize_snake_case() {
        let json = serde_json::to_string(&AppErrorCode::InvalidLength).unwrap();
        assert_eq!(json, "\"invalid_length\"");
    }
}
