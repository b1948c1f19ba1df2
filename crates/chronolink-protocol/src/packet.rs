use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::header::encode_frame;
use crate::id::DeviceId;
use crate::message::Message;
use crate::status::DeviceStatus;

/// Who is talking to whom. Doubles as the frame header's packet-kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Direction {
    MasterToSlave = 0x00,
    SlaveToMaster = 0x01,
    BackendToMaster = 0x02,
    MasterToBackend = 0x03,
    SlaveToBackend = 0x04,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::MasterToSlave,
        Direction::SlaveToMaster,
        Direction::BackendToMaster,
        Direction::MasterToBackend,
        Direction::SlaveToBackend,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_u8() == value)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Bytes of addressing that follow the message id.
    pub fn address_len(self) -> usize {
        match self {
            Direction::MasterToSlave | Direction::SlaveToMaster => 4,
            Direction::BackendToMaster | Direction::MasterToBackend => 0,
            Direction::SlaveToBackend => 6,
        }
    }

    /// Smallest valid packet: message id plus addressing.
    pub fn min_packet_len(self) -> usize {
        1 + self.address_len()
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::MasterToSlave => "master->slave",
            Direction::SlaveToMaster => "slave->master",
            Direction::BackendToMaster => "backend->master",
            Direction::MasterToBackend => "master->backend",
            Direction::SlaveToBackend => "slave->backend",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Addressing field of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Address {
    /// Backend <-> Master traffic carries no address.
    None,
    /// Destination (Master->Slave) or source (Slave->Master) device.
    Device { id: DeviceId },
    /// Slave->Backend uploads: originating slave plus its peripheral status.
    Slave { id: DeviceId, status: DeviceStatus },
}

impl Address {
    pub fn device(id: DeviceId) -> Self {
        Address::Device { id }
    }

    /// The device id carried, if any.
    pub fn id(&self) -> Option<DeviceId> {
        match self {
            Address::None => None,
            Address::Device { id } | Address::Slave { id, .. } => Some(*id),
        }
    }

    fn fits(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (
                Address::None,
                Direction::BackendToMaster | Direction::MasterToBackend
            ) | (
                Address::Device { .. },
                Direction::MasterToSlave | Direction::SlaveToMaster
            ) | (Address::Slave { .. }, Direction::SlaveToBackend)
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::None => f.write_str("none"),
            Address::Device { id } => write!(f, "{id}"),
            Address::Slave { id, status } => write!(f, "{id} status=0x{:04X}", status.bits()),
        }
    }
}

/// An addressed, typed-but-still-serialized message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub direction: Direction,
    pub message_id: u8,
    pub address: Address,
    /// Serialized message body.
    pub payload: Bytes,
}

impl Packet {
    /// Wire size of the packet (without frame header).
    pub fn encoded_len(&self) -> usize {
        self.direction.min_packet_len() + self.payload.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.message_id);
        match self.address {
            Address::None => {}
            Address::Device { id } => dst.put_slice(&id.to_wire()),
            Address::Slave { id, status } => {
                dst.put_slice(&id.to_wire());
                dst.put_u16_le(status.bits());
            }
        }
        dst.put_slice(&self.payload);
    }
}

/// Converts between messages and packets.
pub struct PacketCodec;

impl PacketCodec {
    /// Serialize `message` into a packet addressed by `address`.
    ///
    /// The address variant must match the message's direction.
    pub fn pack(message: &Message, address: Address) -> Result<Packet> {
        let direction = message.direction();
        if !address.fits(direction) {
            return Err(ProtocolError::InvalidAddress {
                direction,
                address: address.to_string(),
            });
        }

        let mut body = BytesMut::new();
        message.encode(&mut body)?;
        Ok(Packet {
            direction,
            message_id: message.message_id(),
            address,
            payload: body.freeze(),
        })
    }

    /// Split raw packet bytes into id, addressing and body.
    pub fn unpack(direction: Direction, bytes: &[u8]) -> Result<Packet> {
        let min = direction.min_packet_len();
        if bytes.len() < min {
            return Err(ProtocolError::Format {
                direction,
                len: bytes.len(),
                min,
            });
        }

        let message_id = bytes[0];
        let wire_id = || DeviceId::from_wire([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let address = match direction {
            Direction::BackendToMaster | Direction::MasterToBackend => Address::None,
            Direction::MasterToSlave | Direction::SlaveToMaster => Address::device(wire_id()),
            Direction::SlaveToBackend => Address::Slave {
                id: wire_id(),
                status: DeviceStatus(u16::from_le_bytes([bytes[5], bytes[6]])),
            },
        };

        Ok(Packet {
            direction,
            message_id,
            address,
            payload: Bytes::copy_from_slice(&bytes[min..]),
        })
    }

    /// Pack `message` and append the complete protocol frame to `dst`.
    pub fn pack_frame(message: &Message, address: Address, dst: &mut BytesMut) -> Result<()> {
        let packet = Self::pack(message, address)?;
        let mut raw = BytesMut::with_capacity(packet.encoded_len());
        packet.encode(&mut raw);
        encode_frame(packet.direction, &raw, dst)
    }
}
