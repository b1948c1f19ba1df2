//! Link frame type byte.

/// Time-synchronization traffic.
pub const SYNC: u8 = 0;

/// Master-issued command.
pub const COMMAND: u8 = 1;

/// Reply to a command.
pub const REPLY: u8 = 2;

/// Anything else seen on the wire.
pub const UNKNOWN: u8 = 3;

/// Returns a human-readable name for a link frame type.
pub fn kind_name(kind: u8) -> &'static str {
    match kind {
        SYNC => "SYNC",
        COMMAND => "COMMAND",
        REPLY => "REPLY",
        _ => "UNKNOWN",
    }
}
