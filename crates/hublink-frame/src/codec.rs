use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (4) + payload size (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Link magic, checked before the size field is trusted.
pub const MAGIC: u32 = 0x6772_8269;

/// Default maximum payload size: 32 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 0x8000;

const MAGIC_SIZE: usize = 4;

/// One routable unit on the link.
///
/// Immutable once built; moving a `Frame` moves ownership of its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The frame payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a payload into the wire format.
///
/// ```text
/// ┌──────────────────┬──────────────┬─────────────────┐
/// │ Magic (4B LE)    │ Size (4B LE) │ Payload         │
/// │ 0x67728269       │              │ (Size bytes)    │
/// └──────────────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Total wire length of the frame at the start of `src`.
///
/// Returns `Ok(None)` while more bytes are needed. The magic is validated as
/// soon as four bytes are present, before the size field is looked at.
pub fn frame_len(src: &[u8], max_payload: usize) -> Result<Option<usize>> {
    if src.len() < MAGIC_SIZE {
        return Ok(None);
    }
    let found = read_u32_le(&src[..MAGIC_SIZE]);
    if found != MAGIC {
        return Err(FrameError::InvalidMagic { found });
    }
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let payload_len = read_u32_le(&src[MAGIC_SIZE..HEADER_SIZE]) as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None);
    }
    Ok(Some(total))
}

/// Decode a frame from a stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(total) = frame_len(src, max_payload)? else {
        return Ok(None);
    };
    let mut wire = src.split_to(total);
    wire.advance(HEADER_SIZE);
    Ok(Some(Frame {
        payload: wire.freeze(),
    }))
}

/// Parse exactly one frame from a complete datagram.
///
/// Unlike [`decode_frame`], the declared size must account for every byte
/// received; short and long datagrams are both rejected.
pub fn parse_frame(raw: &[u8], max_payload: usize) -> Result<Frame> {
    if raw.len() < HEADER_SIZE {
        if raw.len() >= MAGIC_SIZE {
            let found = read_u32_le(&raw[..MAGIC_SIZE]);
            if found != MAGIC {
                return Err(FrameError::InvalidMagic { found });
            }
        }
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            actual: raw.len(),
        });
    }

    let found = read_u32_le(&raw[..MAGIC_SIZE]);
    if found != MAGIC {
        return Err(FrameError::InvalidMagic { found });
    }
    let declared = read_u32_le(&raw[MAGIC_SIZE..HEADER_SIZE]) as usize;
    if declared > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: declared,
            max: max_payload,
        });
    }
    let actual = raw.len() - HEADER_SIZE;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    Ok(Frame {
        payload: Bytes::copy_from_slice(&raw[HEADER_SIZE..]),
    })
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 32 KiB.
    pub max_payload_size: usize,
    /// Write timeout for blocking stream operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            write_timeout: None,
        }
    }
}
