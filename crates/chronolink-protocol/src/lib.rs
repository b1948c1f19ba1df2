//! Packet and message layer of the ChronoLink harness-test protocol.
//!
//! A reassembled link payload is a protocol frame:
//!
//! ```text
//! [0xAB][0xCD][packet kind][frag idx][more][len lo][len hi][packet ...]
//! ```
//!
//! The packet starts with a per-direction message id, followed by the
//! direction's addressing field and the message body. [`FrameParser`] turns
//! such bytes into an [`Envelope`] holding a typed [`Message`].

pub mod error;
pub mod header;
pub mod id;
pub mod message;
pub mod packet;
pub mod parser;
pub mod status;

pub use error::{ProtocolError, Result};
pub use header::{encode_frame, FrameHeader, FRAME_DELIMITER, FRAME_HEADER_SIZE};
pub use id::DeviceId;
pub use message::{
    BackendToMaster, MasterToBackend, MasterToSlave, Message, MessageKind, SlaveToBackend,
    SlaveToMaster,
};
pub use packet::{Address, Direction, Packet, PacketCodec};
pub use parser::{Envelope, FrameParser};
pub use status::DeviceStatus;
