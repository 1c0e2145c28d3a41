use std::fmt;

use hublink_frame::handle::handle_name;
use hublink_frame::{AppHeader, MessageKind};
use serde::Serialize;

use crate::clock::format_nanos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "in",
            Direction::Outbound => "out",
        }
    }
}

/// One line of bridge traffic history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub direction: Direction,
    /// `None` when the payload was too short to carry a header.
    pub handle: Option<u8>,
    #[serde(serialize_with = "serialize_kind")]
    pub kind: Option<MessageKind>,
    pub command: u16,
    pub size: usize,
    pub record_time_ns: u64,
    /// Time spent dispatching (inbound) or writing (outbound).
    pub processing_ns: u64,
    pub error: Option<String>,
}

impl MessageSummary {
    /// Summarize a frame payload. Undecodable headers are recorded, not rejected.
    pub fn from_raw(direction: Direction, payload: &[u8], record_time_ns: u64) -> Self {
        let (header, error) = match AppHeader::decode(payload) {
            Ok(header) => (Some(header), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self {
            direction,
            handle: header.map(|h| h.handle),
            kind: header.map(|h| h.kind),
            command: header.map_or(0, |h| h.command),
            size: payload.len(),
            record_time_ns,
            processing_ns: 0,
            error,
        }
    }
}

fn serialize_kind<S: serde::Serializer>(
    kind: &Option<MessageKind>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match kind {
        Some(kind) => serializer.serialize_str(kind.as_str()),
        None => serializer.serialize_none(),
    }
}

impl fmt::Display for MessageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<3} ",
            format_nanos(self.record_time_ns),
            self.direction.as_str()
        )?;
        match (self.handle, self.kind) {
            (Some(handle), Some(kind)) => write!(
                f,
                "handle=0x{handle:02x}({}) {} cmd=0x{:04x}",
                handle_name(handle),
                kind.as_str(),
                self.command
            )?,
            _ => f.write_str("<no header>")?,
        }
        write!(f, " size={} took={}us", self.size, self.processing_ns / 1_000)?;
        if let Some(error) = &self.error {
            write!(f, " error={error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use hublink_frame::TIMESYNC;

    use super::*;

    #[test]
    fn summarizes_decodable_payload() {
        let mut payload = BytesMut::new();
        AppHeader::request(TIMESYNC, 1, 0x0001).encode(&mut payload);

        let summary = MessageSummary::from_raw(Direction::Outbound, &payload, 1_500_000_000);
        assert_eq!(summary.handle, Some(TIMESYNC));
        assert_eq!(summary.kind, Some(MessageKind::Request));
        assert!(summary.error.is_none());

        let line = summary.to_string();
        assert!(line.starts_with("[1.500 000 000] out"));
        assert!(line.contains("handle=0x02(TIMESYNC) request cmd=0x0001"));
    }

    #[test]
    fn records_undecodable_payload() {
        let summary = MessageSummary::from_raw(Direction::Inbound, &[0x02, 0x01], 0);
        assert_eq!(summary.handle, None);
        assert!(summary.error.is_some());
        assert!(summary.to_string().contains("<no header>"));
    }
}
