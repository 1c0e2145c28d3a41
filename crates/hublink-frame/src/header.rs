use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Application header: handle (1) + kind (1) + transaction (1) + status (1) + command (2).
pub const APP_HEADER_SIZE: usize = 6;

/// Direction and role of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Host client → hub service.
    Request = 0,
    /// Hub service → host client, answers a request.
    Response = 1,
    /// Unsolicited hub → host message.
    Notification = 2,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::Response),
            2 => Ok(MessageKind::Notification),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

/// Routing header at the start of every protocol payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppHeader {
    /// Service handle the message is addressed to (or comes from).
    pub handle: u8,
    pub kind: MessageKind,
    /// Echoed by the hub so a late answer can be told from the current one.
    pub transaction: u8,
    /// Zero on success; service-defined failure code otherwise.
    pub status: u8,
    /// Service command discriminator.
    pub command: u16,
}

impl AppHeader {
    /// Header for a host request.
    pub fn request(handle: u8, transaction: u8, command: u16) -> Self {
        Self {
            handle,
            kind: MessageKind::Request,
            transaction,
            status: 0,
            command,
        }
    }

    /// Header answering this request.
    pub fn response(&self) -> Self {
        Self {
            kind: MessageKind::Response,
            ..*self
        }
    }

    /// Header for an unsolicited hub message.
    pub fn notification(handle: u8, command: u16) -> Self {
        Self {
            handle,
            kind: MessageKind::Notification,
            transaction: 0,
            status: 0,
            command,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(APP_HEADER_SIZE);
        dst.put_slice(&self.to_bytes());
    }

    /// The header's wire bytes.
    pub fn to_bytes(&self) -> [u8; APP_HEADER_SIZE] {
        let [lo, hi] = self.command.to_le_bytes();
        [
            self.handle,
            self.kind as u8,
            self.transaction,
            self.status,
            lo,
            hi,
        ]
    }

    /// Decode the header at the start of `src`; trailing bytes are the body.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < APP_HEADER_SIZE {
            return Err(FrameError::Truncated {
                needed: APP_HEADER_SIZE,
                actual: src.len(),
            });
        }
        Ok(Self {
            handle: src[0],
            kind: MessageKind::try_from(src[1])?,
            transaction: src[2],
            status: src[3],
            command: u16::from_le_bytes([src[4], src[5]]),
        })
    }
}
