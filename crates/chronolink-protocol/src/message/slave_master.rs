//! Slave -> Master replies.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::message::master_slave::{ClipCfg, CondCfg, ResCfg};
use crate::message::wire::{put_len_prefixed, Body, FieldReader};
use crate::packet::Direction;
use crate::status::DeviceStatus;

/// Status byte a slave uses for "applied".
pub const STATUS_OK: u8 = 0x00;

/// Status byte a slave uses for a configuration it cannot apply.
pub const STATUS_INVALID_CFG: u8 = 0x01;

/// Acknowledges a [`CondCfg`], echoing the applied configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CondInfo {
    pub status: u8,
    pub cfg: CondCfg,
}

impl Body for CondInfo {
    const NAME: &'static str = "CondInfo";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        self.cfg.encode(dst)
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            cfg: CondCfg::decode(fields)?,
        })
    }
}

/// Acknowledges a [`ResCfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResInfo {
    pub status: u8,
    pub cfg: ResCfg,
}

impl Body for ResInfo {
    const NAME: &'static str = "ResInfo";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        self.cfg.encode(dst)
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            cfg: ResCfg::decode(fields)?,
        })
    }
}

/// Acknowledges a [`ClipCfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClipInfo {
    pub status: u8,
    pub cfg: ClipCfg,
}

impl Body for ClipInfo {
    const NAME: &'static str = "ClipInfo";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        self.cfg.encode(dst)
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            cfg: ClipCfg::decode(fields)?,
        })
    }
}

/// Conduction or resistance results addressed to the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataReport {
    pub device_status: DeviceStatus,
    pub data: Bytes,
}

impl Body for DataReport {
    const NAME: &'static str = "DataReport";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16_le(self.device_status.bits());
        put_len_prefixed(dst, "report data", &self.data)
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            device_status: fields.status()?,
            data: fields.len_prefixed()?,
        })
    }
}

/// Clip sensor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClipReport {
    pub device_status: DeviceStatus,
    pub clip_data: u16,
}

impl Body for ClipReport {
    const NAME: &'static str = "ClipReport";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16_le(self.device_status.bits());
        dst.put_u16_le(self.clip_data);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            device_status: fields.status()?,
            clip_data: fields.u16_le()?,
        })
    }
}

/// Acknowledges a reset, reporting the resulting lock and LED state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RstAck {
    pub status: u8,
    pub lock_status: u8,
    pub clip_led: u16,
}

impl Body for RstAck {
    const NAME: &'static str = "RstAck";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        dst.put_u8(self.lock_status);
        dst.put_u16_le(self.clip_led);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            lock_status: fields.u8()?,
            clip_led: fields.u16_le()?,
        })
    }
}

/// Answer to a ping, echoing its sequence and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PingRsp {
    pub sequence: u16,
    pub timestamp: u32,
}

impl Body for PingRsp {
    const NAME: &'static str = "PingRsp";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16_le(self.sequence);
        dst.put_u32_le(self.timestamp);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            sequence: fields.u16_le()?,
            timestamp: fields.u32_le()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum SlaveToMaster {
    CondInfo(CondInfo),
    ResInfo(ResInfo),
    ClipInfo(ClipInfo),
    CondData(DataReport),
    ResData(DataReport),
    ClipData(ClipReport),
    Rst(RstAck),
    PingRsp(PingRsp),
}

impl SlaveToMaster {
    pub const COND_INFO: u8 = 0x10;
    pub const RES_INFO: u8 = 0x11;
    pub const CLIP_INFO: u8 = 0x12;
    pub const COND_DATA: u8 = 0x20;
    pub const RES_DATA: u8 = 0x21;
    pub const CLIP_DATA: u8 = 0x22;
    pub const RST: u8 = 0x30;
    pub const PING_RSP: u8 = 0x40;

    pub fn message_id(&self) -> u8 {
        match self {
            Self::CondInfo(_) => Self::COND_INFO,
            Self::ResInfo(_) => Self::RES_INFO,
            Self::ClipInfo(_) => Self::CLIP_INFO,
            Self::CondData(_) => Self::COND_DATA,
            Self::ResData(_) => Self::RES_DATA,
            Self::ClipData(_) => Self::CLIP_DATA,
            Self::Rst(_) => Self::RST,
            Self::PingRsp(_) => Self::PING_RSP,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CondInfo(_) => "CondInfo",
            Self::ResInfo(_) => "ResInfo",
            Self::ClipInfo(_) => "ClipInfo",
            Self::CondData(_) => "CondData",
            Self::ResData(_) => "ResData",
            Self::ClipData(_) => "ClipData",
            Self::Rst(_) => "Rst",
            Self::PingRsp(_) => "PingRsp",
        }
    }

    /// The reply's status byte, for messages that carry one.
    pub fn status(&self) -> Option<u8> {
        match self {
            Self::CondInfo(m) => Some(m.status),
            Self::ResInfo(m) => Some(m.status),
            Self::ClipInfo(m) => Some(m.status),
            Self::Rst(m) => Some(m.status),
            Self::CondData(_) | Self::ResData(_) | Self::ClipData(_) | Self::PingRsp(_) => None,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::CondInfo(m) => m.encode(dst),
            Self::ResInfo(m) => m.encode(dst),
            Self::ClipInfo(m) => m.encode(dst),
            Self::CondData(m) | Self::ResData(m) => m.encode(dst),
            Self::ClipData(m) => m.encode(dst),
            Self::Rst(m) => m.encode(dst),
            Self::PingRsp(m) => m.encode(dst),
        }
    }

    pub fn decode(message_id: u8, body: &[u8]) -> Result<Self> {
        match message_id {
            Self::COND_INFO => CondInfo::read(body).map(Self::CondInfo),
            Self::RES_INFO => ResInfo::read(body).map(Self::ResInfo),
            Self::CLIP_INFO => ClipInfo::read(body).map(Self::ClipInfo),
            Self::COND_DATA => DataReport::read(body).map(Self::CondData),
            Self::RES_DATA => DataReport::read(body).map(Self::ResData),
            Self::CLIP_DATA => ClipReport::read(body).map(Self::ClipData),
            Self::RST => RstAck::read(body).map(Self::Rst),
            Self::PING_RSP => PingRsp::read(body).map(Self::PingRsp),
            other => Err(ProtocolError::UnknownMessage {
                direction: Direction::SlaveToMaster,
                message_id: other,
            }),
        }
    }
}
