use bytes::{BufMut, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::packet::Direction;

/// Protocol frame header size.
pub const FRAME_HEADER_SIZE: usize = 7;

/// Protocol frame delimiter.
pub const FRAME_DELIMITER: [u8; 2] = [0xAB, 0xCD];

/// Header in front of every packet.
///
/// Packets are never split at this layer; the link framer below does all
/// fragmentation, so encoders write index 0 with the flag clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Packet kind (direction) byte.
    pub kind: u8,
    pub fragment_index: u8,
    pub more_fragments: bool,
    /// Packet length in bytes.
    pub length: u16,
}

impl FrameHeader {
    /// Read and check the header at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::TruncatedHeader { len: bytes.len() });
        }
        if bytes[..2] != FRAME_DELIMITER {
            return Err(ProtocolError::BadDelimiter {
                found: [bytes[0], bytes[1]],
            });
        }
        Ok(Self {
            kind: bytes[2],
            fragment_index: bytes[3],
            more_fragments: bytes[4] != 0,
            length: u16::from_le_bytes([bytes[5], bytes[6]]),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(&FRAME_DELIMITER);
        dst.put_u8(self.kind);
        dst.put_u8(self.fragment_index);
        dst.put_u8(u8::from(self.more_fragments));
        dst.put_u16_le(self.length);
    }
}

/// Write a complete protocol frame around already-encoded packet bytes.
pub fn encode_frame(direction: Direction, packet: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = u16::try_from(packet.len()).map_err(|_| ProtocolError::TooLong {
        what: "packet",
        len: packet.len(),
        max: u16::MAX as usize,
    })?;
    dst.reserve(FRAME_HEADER_SIZE + packet.len());
    FrameHeader {
        kind: direction.as_u8(),
        fragment_index: 0,
        more_fragments: false,
        length,
    }
    .encode(dst);
    dst.put_slice(packet);
    Ok(())
}
