//! Typed messages, one closed enum per direction.

pub mod backend;
pub mod master_slave;
pub mod slave_master;
pub mod upload;
pub(crate) mod wire;

use std::fmt;

use bytes::BytesMut;
use serde::Serialize;

pub use backend::{BackendToMaster, MasterToBackend};
pub use master_slave::MasterToSlave;
pub use slave_master::SlaveToMaster;
pub use upload::SlaveToBackend;

use crate::error::Result;
use crate::packet::Direction;

/// Any protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", content = "body", rename_all = "snake_case")]
pub enum Message {
    MasterToSlave(MasterToSlave),
    SlaveToMaster(SlaveToMaster),
    BackendToMaster(BackendToMaster),
    MasterToBackend(MasterToBackend),
    SlaveToBackend(SlaveToBackend),
}

impl Message {
    pub fn direction(&self) -> Direction {
        match self {
            Message::MasterToSlave(_) => Direction::MasterToSlave,
            Message::SlaveToMaster(_) => Direction::SlaveToMaster,
            Message::BackendToMaster(_) => Direction::BackendToMaster,
            Message::MasterToBackend(_) => Direction::MasterToBackend,
            Message::SlaveToBackend(_) => Direction::SlaveToBackend,
        }
    }

    pub fn message_id(&self) -> u8 {
        match self {
            Message::MasterToSlave(m) => m.message_id(),
            Message::SlaveToMaster(m) => m.message_id(),
            Message::BackendToMaster(m) => m.message_id(),
            Message::MasterToBackend(m) => m.message_id(),
            Message::SlaveToBackend(m) => m.message_id(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::new(self.direction(), self.message_id())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::MasterToSlave(m) => m.name(),
            Message::SlaveToMaster(m) => m.name(),
            Message::BackendToMaster(m) => m.name(),
            Message::MasterToBackend(m) => m.name(),
            Message::SlaveToBackend(m) => m.name(),
        }
    }

    /// Serialize the message body (no id, no address).
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Message::MasterToSlave(m) => m.encode(dst),
            Message::SlaveToMaster(m) => m.encode(dst),
            Message::BackendToMaster(m) => m.encode(dst),
            Message::MasterToBackend(m) => m.encode(dst),
            Message::SlaveToBackend(m) => m.encode(dst),
        }
    }

    /// Decode a message body given its direction and id.
    pub fn decode(direction: Direction, message_id: u8, body: &[u8]) -> Result<Self> {
        Ok(match direction {
            Direction::MasterToSlave => MasterToSlave::decode(message_id, body)?.into(),
            Direction::SlaveToMaster => SlaveToMaster::decode(message_id, body)?.into(),
            Direction::BackendToMaster => BackendToMaster::decode(message_id, body)?.into(),
            Direction::MasterToBackend => MasterToBackend::decode(message_id, body)?.into(),
            Direction::SlaveToBackend => SlaveToBackend::decode(message_id, body)?.into(),
        })
    }
}

impl From<MasterToSlave> for Message {
    fn from(m: MasterToSlave) -> Self {
        Message::MasterToSlave(m)
    }
}

impl From<SlaveToMaster> for Message {
    fn from(m: SlaveToMaster) -> Self {
        Message::SlaveToMaster(m)
    }
}

impl From<BackendToMaster> for Message {
    fn from(m: BackendToMaster) -> Self {
        Message::BackendToMaster(m)
    }
}

impl From<MasterToBackend> for Message {
    fn from(m: MasterToBackend) -> Self {
        Message::MasterToBackend(m)
    }
}

impl From<SlaveToBackend> for Message {
    fn from(m: SlaveToBackend) -> Self {
        Message::SlaveToBackend(m)
    }
}

/// Direction plus message id: what a command expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MessageKind {
    pub direction: Direction,
    pub message_id: u8,
}

impl MessageKind {
    pub const fn new(direction: Direction, message_id: u8) -> Self {
        Self {
            direction,
            message_id,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/0x{:02X}", self.direction, self.message_id)
    }
}
