use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{ProtocolError, Result};
use crate::header::{FrameHeader, FRAME_HEADER_SIZE};
use crate::id::DeviceId;
use crate::message::{Message, MessageKind};
use crate::packet::{Address, Direction, PacketCodec};

/// A decoded message together with its packet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub address: Address,
    pub message: Message,
}

impl Envelope {
    pub fn new(address: Address, message: impl Into<Message>) -> Self {
        Self {
            address,
            message: message.into(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.message.direction()
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    /// Device id from the address field, if the direction carries one.
    pub fn device(&self) -> Option<DeviceId> {
        self.address.id()
    }
}

/// Turns protocol frame bytes into typed messages.
///
/// A parser built with [`FrameParser::for_device`] drops Master->Slave
/// packets addressed to other devices; broadcast packets always pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameParser {
    local_id: Option<DeviceId>,
}

impl FrameParser {
    /// Parser without destination filtering (master and backend side).
    pub fn new() -> Self {
        Self { local_id: None }
    }

    /// Parser for a slave with identity `id`.
    pub fn for_device(id: DeviceId) -> Self {
        Self { local_id: Some(id) }
    }

    pub fn local_id(&self) -> Option<DeviceId> {
        self.local_id
    }

    /// Parse one complete protocol frame, reporting why it was rejected.
    pub fn try_parse(&self, bytes: &[u8]) -> Result<Envelope> {
        let header = FrameHeader::decode(bytes)?;
        let declared = header.length as usize;
        if bytes.len() != FRAME_HEADER_SIZE + declared {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: bytes.len() - FRAME_HEADER_SIZE,
            });
        }

        let direction =
            Direction::from_u8(header.kind).ok_or(ProtocolError::UnknownDirection(header.kind))?;
        let packet = PacketCodec::unpack(direction, &bytes[FRAME_HEADER_SIZE..])?;

        if let (Direction::MasterToSlave, Some(local), Some(destination)) =
            (direction, self.local_id, packet.address.id())
        {
            if destination != local && !destination.is_broadcast() {
                return Err(ProtocolError::AddressMismatch { destination, local });
            }
        }

        let message = Message::decode(direction, packet.message_id, &packet.payload)?;
        Ok(Envelope {
            address: packet.address,
            message,
        })
    }

    /// Parse one frame; anything unusable is logged and dropped.
    pub fn parse(&self, bytes: &[u8]) -> Option<Envelope> {
        match self.try_parse(bytes) {
            Ok(envelope) => {
                trace!(
                    message = envelope.message.name(),
                    address = %envelope.address,
                    "frame parsed"
                );
                Some(envelope)
            }
            Err(ProtocolError::AddressMismatch { destination, .. }) => {
                trace!(%destination, "frame for another device; dropped");
                None
            }
            Err(
                err @ (ProtocolError::UnknownMessage { .. } | ProtocolError::UnknownDirection(_)),
            ) => {
                warn!(error = %err, "unknown message; dropped");
                None
            }
            Err(err) => {
                debug!(error = %err, len = bytes.len(), "malformed frame; dropped");
                None
            }
        }
    }
}
