//! Reserved service handles.
//!
//! Handles below [`FIRST_SERVICE`] are fixed by the protocol. Handles from
//! `FIRST_SERVICE` upward are assigned to negotiated services.

/// No destination; used for broadcast notifications.
pub const NONE: u8 = 0x00;

/// Loopback test service.
pub const LOOPBACK: u8 = 0x01;

/// Clock synchronization service.
pub const TIMESYNC: u8 = 0x02;

/// Liveness probe/acknowledgement.
pub const PULSE: u8 = 0x03;

/// Service discovery.
pub const DISCOVERY: u8 = 0x0F;

/// First handle available to negotiated services.
pub const FIRST_SERVICE: u8 = 0x10;

/// Returns a human-readable name for a handle.
pub fn handle_name(handle: u8) -> &'static str {
    match handle {
        NONE => "NONE",
        LOOPBACK => "LOOPBACK",
        TIMESYNC => "TIMESYNC",
        PULSE => "PULSE",
        DISCOVERY => "DISCOVERY",
        0x04..=0x0E => "RESERVED",
        _ => "SERVICE",
    }
}

/// Returns true if the handle is fixed by the protocol.
pub fn is_reserved(handle: u8) -> bool {
    handle < FIRST_SERVICE
}
