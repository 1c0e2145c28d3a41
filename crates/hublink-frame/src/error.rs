/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header does not start with the link magic.
    #[error("invalid frame magic 0x{found:08x} (expected 0x67728269)")]
    InvalidMagic { found: u32 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Zero-length payloads carry nothing routable.
    #[error("empty payload")]
    EmptyPayload,

    /// The declared payload size disagrees with the bytes received.
    #[error("frame declares {declared} payload bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Not enough bytes for a fixed-size header.
    #[error("truncated header ({actual} bytes, need {needed})")]
    Truncated { needed: usize, actual: usize },

    /// The application header names a message kind this side does not know.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
