use crate::id::DeviceId;
use crate::packet::Direction;

/// Errors produced while building or parsing protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Fewer bytes than the 7-byte frame header.
    #[error("framing error: truncated header ({len} bytes)")]
    TruncatedHeader { len: usize },

    /// The frame does not start with `0xAB 0xCD`.
    #[error("framing error: bad delimiter {found:02X?}")]
    BadDelimiter { found: [u8; 2] },

    /// The header's length field disagrees with the bytes present.
    #[error("framing error: declared length {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The packet is shorter than its direction's minimum header.
    #[error("format error: {direction} packet needs {min} bytes, got {len}")]
    Format {
        direction: Direction,
        len: usize,
        min: usize,
    },

    /// A message body ended before all its fields were read.
    #[error("format error: {message} needs {needed} more bytes, {available} left")]
    Truncated {
        message: &'static str,
        needed: usize,
        available: usize,
    },

    /// The address supplied to `pack` does not fit the direction.
    #[error("address {address} is not valid for {direction}")]
    InvalidAddress {
        direction: Direction,
        address: String,
    },

    /// Destination filter rejected the packet.
    #[error("destination {destination} does not match local device {local}")]
    AddressMismatch {
        destination: DeviceId,
        local: DeviceId,
    },

    /// Unrecognized packet kind byte.
    #[error("unknown packet kind 0x{0:02X}")]
    UnknownDirection(u8),

    /// Unrecognized message id within a known direction.
    #[error("unknown message 0x{message_id:02X} for {direction}")]
    UnknownMessage { direction: Direction, message_id: u8 },

    /// A count-prefixed list or length-prefixed blob is too long to encode.
    #[error("{what} too long ({len}, max {max})")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// Device id text could not be parsed.
    #[error("invalid device id {0:?}")]
    InvalidDeviceId(String),
}

impl ProtocolError {
    /// Whether this is a delimiter/length/header fault.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::TruncatedHeader { .. } | Self::BadDelimiter { .. } | Self::LengthMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
