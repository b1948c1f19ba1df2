//! Slave -> Backend result uploads, relayed verbatim by the master.
//!
//! The originating slave and its peripheral status travel in the packet
//! address, so these bodies carry only the measurement.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::message::wire::{put_len_prefixed, Body, FieldReader};
use crate::packet::Direction;

/// Conduction or resistance measurement bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadData {
    pub data: Bytes,
}

impl Body for UploadData {
    const NAME: &'static str = "UploadData";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_len_prefixed(dst, "upload data", &self.data)
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            data: fields.len_prefixed()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadClip {
    pub clip_data: u16,
}

impl Body for UploadClip {
    const NAME: &'static str = "UploadClip";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16_le(self.clip_data);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            clip_data: fields.u16_le()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum SlaveToBackend {
    CondData(UploadData),
    ResData(UploadData),
    ClipData(UploadClip),
}

impl SlaveToBackend {
    pub const COND_DATA: u8 = 0x20;
    pub const RES_DATA: u8 = 0x21;
    pub const CLIP_DATA: u8 = 0x22;

    pub fn message_id(&self) -> u8 {
        match self {
            Self::CondData(_) => Self::COND_DATA,
            Self::ResData(_) => Self::RES_DATA,
            Self::ClipData(_) => Self::CLIP_DATA,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CondData(_) => "CondData",
            Self::ResData(_) => "ResData",
            Self::ClipData(_) => "ClipData",
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::CondData(m) | Self::ResData(m) => m.encode(dst),
            Self::ClipData(m) => m.encode(dst),
        }
    }

    pub fn decode(message_id: u8, body: &[u8]) -> Result<Self> {
        match message_id {
            Self::COND_DATA => UploadData::read(body).map(Self::CondData),
            Self::RES_DATA => UploadData::read(body).map(Self::ResData),
            Self::CLIP_DATA => UploadClip::read(body).map(Self::ClipData),
            other => Err(ProtocolError::UnknownMessage {
                direction: Direction::SlaveToBackend,
                message_id: other,
            }),
        }
    }
}
