//! Frame codec and application header for host/hub messaging.
//!
//! Every frame on the link is:
//! - a 4-byte little-endian magic number (`0x67728269`)
//! - a 4-byte little-endian payload size
//! - the payload
//!
//! The payload of every protocol message starts with a 6-byte [`AppHeader`]
//! naming the destination handle and the command.

pub mod codec;
pub mod error;
pub mod handle;
pub mod header;
pub mod reader;
pub mod writer;

#[cfg(unix)]
pub mod link;

pub use codec::{
    decode_frame, encode_frame, frame_len, parse_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use handle::{DISCOVERY, FIRST_SERVICE, LOOPBACK, NONE, PULSE, TIMESYNC};
pub use header::{AppHeader, MessageKind, APP_HEADER_SIZE};
#[cfg(unix)]
pub use link::StreamLink;
pub use reader::FrameReader;
pub use writer::FrameWriter;
