//! Master -> Slave commands.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::message::wire::{Body, FieldReader};
use crate::packet::Direction;

/// Starts (or re-arms) a synchronized test cycle on every slave.
///
/// `timestamp` is the only big-endian field in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sync {
    pub mode: u8,
    pub timestamp: u32,
}

impl Body for Sync {
    const NAME: &'static str = "Sync";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.mode);
        dst.put_u32(self.timestamp);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            mode: fields.u8()?,
            timestamp: fields.u32_be()?,
        })
    }
}

/// Conduction-test window for one slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CondCfg {
    pub time_slot: u8,
    pub interval: u8,
    pub total_conduction_num: u16,
    pub start_conduction_num: u16,
    pub conduction_num: u16,
}

impl Body for CondCfg {
    const NAME: &'static str = "CondCfg";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.time_slot);
        dst.put_u8(self.interval);
        dst.put_u16_le(self.total_conduction_num);
        dst.put_u16_le(self.start_conduction_num);
        dst.put_u16_le(self.conduction_num);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            time_slot: fields.u8()?,
            interval: fields.u8()?,
            total_conduction_num: fields.u16_le()?,
            start_conduction_num: fields.u16_le()?,
            conduction_num: fields.u16_le()?,
        })
    }
}

/// Resistance-test window for one slave. Same layout as [`CondCfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResCfg {
    pub time_slot: u8,
    pub interval: u8,
    pub total_resistance_num: u16,
    pub start_resistance_num: u16,
    pub resistance_num: u16,
}

impl Body for ResCfg {
    const NAME: &'static str = "ResCfg";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.time_slot);
        dst.put_u8(self.interval);
        dst.put_u16_le(self.total_resistance_num);
        dst.put_u16_le(self.start_resistance_num);
        dst.put_u16_le(self.resistance_num);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            time_slot: fields.u8()?,
            interval: fields.u8()?,
            total_resistance_num: fields.u16_le()?,
            start_resistance_num: fields.u16_le()?,
            resistance_num: fields.u16_le()?,
        })
    }
}

/// Clip test setup; `clip_pin` is a bit-mask of active clip positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClipCfg {
    pub interval: u8,
    pub mode: u8,
    pub clip_pin: u16,
}

impl Body for ClipCfg {
    const NAME: &'static str = "ClipCfg";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.interval);
        dst.put_u8(self.mode);
        dst.put_u16_le(self.clip_pin);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            interval: fields.u8()?,
            mode: fields.u8()?,
            clip_pin: fields.u16_le()?,
        })
    }
}

/// Body of the three `Read*Data` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReadData {
    pub reserve: u8,
}

impl Body for ReadData {
    const NAME: &'static str = "ReadData";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.reserve);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            reserve: fields.u8()?,
        })
    }
}

/// Lock and clip-LED reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rst {
    pub lock: u8,
    pub clip_led: u16,
}

impl Body for Rst {
    const NAME: &'static str = "Rst";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.lock);
        dst.put_u16_le(self.clip_led);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            lock: fields.u8()?,
            clip_led: fields.u16_le()?,
        })
    }
}

/// Liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PingReq {
    pub sequence: u16,
    pub timestamp: u32,
}

impl Body for PingReq {
    const NAME: &'static str = "PingReq";

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
pub enum MasterToSlave {
    Sync(Sync),
    CondCfg(CondCfg),
    ResCfg(ResCfg),
    ClipCfg(ClipCfg),
    ReadCondData(ReadData),
    ReadResData(ReadData),
    ReadClipData(ReadData),
    Rst(Rst),
    PingReq(PingReq),
}

impl MasterToSlave {
    pub const SYNC: u8 = 0x00;
    pub const COND_CFG: u8 = 0x10;
    pub const RES_CFG: u8 = 0x11;
    pub const CLIP_CFG: u8 = 0x12;
    pub const READ_COND_DATA: u8 = 0x20;
    pub const READ_RES_DATA: u8 = 0x21;
    pub const READ_CLIP_DATA: u8 = 0x22;
    pub const RST: u8 = 0x30;
    pub const PING_REQ: u8 = 0x40;

    pub fn message_id(&self) -> u8 {
        match self {
            Self::Sync(_) => Self::SYNC,
            Self::CondCfg(_) => Self::COND_CFG,
            Self::ResCfg(_) => Self::RES_CFG,
            Self::ClipCfg(_) => Self::CLIP_CFG,
            Self::ReadCondData(_) => Self::READ_COND_DATA,
            Self::ReadResData(_) => Self::READ_RES_DATA,
            Self::ReadClipData(_) => Self::READ_CLIP_DATA,
            Self::Rst(_) => Self::RST,
            Self::PingReq(_) => Self::PING_REQ,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sync(_) => "Sync",
            Self::CondCfg(_) => "CondCfg",
            Self::ResCfg(_) => "ResCfg",
            Self::ClipCfg(_) => "ClipCfg",
            Self::ReadCondData(_) => "ReadCondData",
            Self::ReadResData(_) => "ReadResData",
            Self::ReadClipData(_) => "ReadClipData",
            Self::Rst(_) => "Rst",
            Self::PingReq(_) => "PingReq",
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::Sync(m) => m.encode(dst),
            Self::CondCfg(m) => m.encode(dst),
            Self::ResCfg(m) => m.encode(dst),
            Self::ClipCfg(m) => m.encode(dst),
            Self::ReadCondData(m) | Self::ReadResData(m) | Self::ReadClipData(m) => m.encode(dst),
            Self::Rst(m) => m.encode(dst),
            Self::PingReq(m) => m.encode(dst),
        }
    }

    pub fn decode(message_id: u8, body: &[u8]) -> Result<Self> {
        match message_id {
            Self::SYNC => Sync::read(body).map(Self::Sync),
            Self::COND_CFG => CondCfg::read(body).map(Self::CondCfg),
            Self::RES_CFG => ResCfg::read(body).map(Self::ResCfg),
            Self::CLIP_CFG => ClipCfg::read(body).map(Self::ClipCfg),
            Self::READ_COND_DATA => ReadData::read(body).map(Self::ReadCondData),
            Self::READ_RES_DATA => ReadData::read(body).map(Self::ReadResData),
            Self::READ_CLIP_DATA => ReadData::read(body).map(Self::ReadClipData),
            Self::RST => Rst::read(body).map(Self::Rst),
            Self::PING_REQ => PingReq::read(body).map(Self::PingReq),
            other => Err(ProtocolError::UnknownMessage {
                direction: Direction::MasterToSlave,
                message_id: other,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: MasterToSlave) -> BytesMut {
        let mut body = BytesMut::new();
        message.encode(&mut body).expect("encode");
        let back = MasterToSlave::decode(message.message_id(), &body).expect("decode");
        assert_eq!(back, message);
        body
    }

    #[test]
    fn sync_timestamp_is_big_endian() {
        let body = roundtrip(MasterToSlave::Sync(Sync {
            mode: 2,
            timestamp: 0x0102_0304,
        }));
        assert_eq!(body.as_ref(), &[0x02, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn cond_cfg_layout() {
        let body = roundtrip(MasterToSlave::CondCfg(CondCfg {
            time_slot: 1,
            interval: 10,
            total_conduction_num: 0x0010,
            start_conduction_num: 0x0002,
            conduction_num: 0x0003,
        }));
        assert_eq!(body.as_ref(), &[1, 10, 0x10, 0x00, 0x02, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn every_variant_survives_encode_decode() {
        for message in [
            MasterToSlave::ResCfg(ResCfg {
                time_slot: 4,
                interval: 1,
                total_resistance_num: 300,
                start_resistance_num: 20,
                resistance_num: 7,
            }),
            MasterToSlave::ClipCfg(ClipCfg {
                interval: 10,
                mode: 1,
                clip_pin: 0x8001,
            }),
            MasterToSlave::ReadCondData(ReadData::default()),
            MasterToSlave::ReadResData(ReadData { reserve: 9 }),
            MasterToSlave::ReadClipData(ReadData::default()),
            MasterToSlave::Rst(Rst {
                lock: 1,
                clip_led: 0x00FF,
            }),
            MasterToSlave::PingReq(PingReq {
                sequence: 7,
                timestamp: 1234,
            }),
        ] {
            roundtrip(message);
        }
    }

    #[test]
    fn clip_cfg_and_rst_sizes() {
        assert_eq!(roundtrip(MasterToSlave::ClipCfg(ClipCfg::default())).len(), 4);
        assert_eq!(roundtrip(MasterToSlave::Rst(Rst::default())).len(), 3);
    }

    #[test]
    fn truncated_body_is_rejected() {
        let err = MasterToSlave::decode(MasterToSlave::COND_CFG, &[1, 2, 3]).expect_err("short");
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                message: "CondCfg",
                ..
            }
        ));
    }

    #[test]
    fn unknown_id_is_reported() {
        let err = MasterToSlave::decode(0x7E, &[]).expect_err("unknown");
        assert!(matches!(
            err,
            ProtocolError::UnknownMessage {
                message_id: 0x7E,
                ..
            }
        ));
    }
}
