//! Backend <-> Master messages. These packets carry no device address.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::id::DeviceId;
use crate::message::wire::{put_count, Body, FieldReader};
use crate::packet::Direction;

/// Per-slave test parameters in a [`SlaveCfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaveCfgEntry {
    pub id: DeviceId,
    pub conduction_num: u8,
    pub resistance_num: u8,
    pub clip_mode: u8,
    pub clip_status: u16,
}

impl SlaveCfgEntry {
    fn put(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.id.to_wire());
        dst.put_u8(self.conduction_num);
        dst.put_u8(self.resistance_num);
        dst.put_u8(self.clip_mode);
        dst.put_u16_le(self.clip_status);
    }

    fn take(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.device_id()?,
            conduction_num: fields.u8()?,
            resistance_num: fields.u8()?,
            clip_mode: fields.u8()?,
            clip_status: fields.u16_le()?,
        })
    }
}

/// Configure a batch of slaves.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SlaveCfg {
    pub entries: Vec<SlaveCfgEntry>,
}

impl Body for SlaveCfg {
    const NAME: &'static str = "SlaveCfg";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_count(dst, "slave entries", self.entries.len())?;
        self.entries.iter().for_each(|e| e.put(dst));
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            entries: fields.counted(SlaveCfgEntry::take)?,
        })
    }
}

/// Per-slave reset parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetEntry {
    pub id: DeviceId,
    pub lock: u8,
    pub clip_status: u16,
}

impl ResetEntry {
    fn put(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.id.to_wire());
        dst.put_u8(self.lock);
        dst.put_u16_le(self.clip_status);
    }

    fn take(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.device_id()?,
            lock: fields.u8()?,
            clip_status: fields.u16_le()?,
        })
    }
}

/// Reset a batch of slaves.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ResetCmd {
    pub entries: Vec<ResetEntry>,
}

impl Body for ResetCmd {
    const NAME: &'static str = "ResetCmd";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_count(dst, "reset entries", self.entries.len())?;
        self.entries.iter().for_each(|e| e.put(dst));
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            entries: fields.counted(ResetEntry::take)?,
        })
    }
}

/// Select the active test mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeCfg {
    pub mode: u8,
}

impl Body for ModeCfg {
    const NAME: &'static str = "ModeCfg";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.mode);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { mode: fields.u8()? })
    }
}

/// Start (1) or stop (0) synchronized testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ctrl {
    pub running_status: u8,
}

impl Body for Ctrl {
    const NAME: &'static str = "Ctrl";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.running_status);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            running_status: fields.u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceListReq {
    pub reserve: u8,
}

impl Body for DeviceListReq {
    const NAME: &'static str = "DeviceListReq";

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

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum BackendToMaster {
    SlaveCfg(SlaveCfg),
    ModeCfg(ModeCfg),
    Rst(ResetCmd),
    Ctrl(Ctrl),
    DeviceListReq(DeviceListReq),
}

impl BackendToMaster {
    pub const SLAVE_CFG: u8 = 0x00;
    pub const MODE_CFG: u8 = 0x01;
    pub const RST: u8 = 0x02;
    pub const CTRL: u8 = 0x03;
    pub const DEVICE_LIST_REQ: u8 = 0x04;

    pub fn message_id(&self) -> u8 {
        match self {
            Self::SlaveCfg(_) => Self::SLAVE_CFG,
            Self::ModeCfg(_) => Self::MODE_CFG,
            Self::Rst(_) => Self::RST,
            Self::Ctrl(_) => Self::CTRL,
            Self::DeviceListReq(_) => Self::DEVICE_LIST_REQ,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SlaveCfg(_) => "SlaveCfg",
            Self::ModeCfg(_) => "ModeCfg",
            Self::Rst(_) => "Rst",
            Self::Ctrl(_) => "Ctrl",
            Self::DeviceListReq(_) => "DeviceListReq",
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::SlaveCfg(m) => m.encode(dst),
            Self::ModeCfg(m) => m.encode(dst),
            Self::Rst(m) => m.encode(dst),
            Self::Ctrl(m) => m.encode(dst),
            Self::DeviceListReq(m) => m.encode(dst),
        }
    }

    pub fn decode(message_id: u8, body: &[u8]) -> Result<Self> {
        match message_id {
            Self::SLAVE_CFG => SlaveCfg::read(body).map(Self::SlaveCfg),
            Self::MODE_CFG => ModeCfg::read(body).map(Self::ModeCfg),
            Self::RST => ResetCmd::read(body).map(Self::Rst),
            Self::CTRL => Ctrl::read(body).map(Self::Ctrl),
            Self::DEVICE_LIST_REQ => DeviceListReq::read(body).map(Self::DeviceListReq),
            other => Err(ProtocolError::UnknownMessage {
                direction: Direction::BackendToMaster,
                message_id: other,
            }),
        }
    }
}

/// Status byte reported back to the backend.
pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_FAILURE: u8 = 0x01;

/// Result of a [`SlaveCfg`]; `entries` lists the devices that failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SlaveCfgRsp {
    pub status: u8,
    pub entries: Vec<SlaveCfgEntry>,
}

impl Body for SlaveCfgRsp {
    const NAME: &'static str = "SlaveCfgRsp";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        put_count(dst, "slave entries", self.entries.len())?;
        self.entries.iter().for_each(|e| e.put(dst));
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            entries: fields.counted(SlaveCfgEntry::take)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeCfgRsp {
    pub status: u8,
    pub mode: u8,
}

impl Body for ModeCfgRsp {
    const NAME: &'static str = "ModeCfgRsp";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        dst.put_u8(self.mode);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            mode: fields.u8()?,
        })
    }
}

/// Result of a [`ResetCmd`]; `entries` lists the devices that failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ResetRsp {
    pub status: u8,
    pub entries: Vec<ResetEntry>,
}

impl Body for ResetRsp {
    const NAME: &'static str = "ResetRsp";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        put_count(dst, "reset entries", self.entries.len())?;
        self.entries.iter().for_each(|e| e.put(dst));
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            entries: fields.counted(ResetEntry::take)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CtrlRsp {
    pub status: u8,
    pub running_status: u8,
}

impl Body for CtrlRsp {
    const NAME: &'static str = "CtrlRsp";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.status);
        dst.put_u8(self.running_status);
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            status: fields.u8()?,
            running_status: fields.u8()?,
        })
    }
}

/// One registered device in a [`DeviceListRsp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceListEntry {
    pub id: DeviceId,
    pub short_id: u8,
    pub online: bool,
    pub version_major: u8,
    pub version_minor: u8,
    pub version_patch: u16,
}

impl DeviceListEntry {
    fn put(&self, dst: &mut BytesMut) {
        dst.put_slice(&self.id.to_wire());
        dst.put_u8(self.short_id);
        dst.put_u8(u8::from(self.online));
        dst.put_u8(self.version_major);
        dst.put_u8(self.version_minor);
        dst.put_u16_le(self.version_patch);
    }

    fn take(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            id: fields.device_id()?,
            short_id: fields.u8()?,
            online: fields.u8()? != 0,
            version_major: fields.u8()?,
            version_minor: fields.u8()?,
            version_patch: fields.u16_le()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceListRsp {
    pub entries: Vec<DeviceListEntry>,
}

impl Body for DeviceListRsp {
    const NAME: &'static str = "DeviceListRsp";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_count(dst, "device list", self.entries.len())?;
        self.entries.iter().for_each(|e| e.put(dst));
        Ok(())
    }

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            entries: fields.counted(DeviceListEntry::take)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum MasterToBackend {
    SlaveCfg(SlaveCfgRsp),
    ModeCfg(ModeCfgRsp),
    Rst(ResetRsp),
    Ctrl(CtrlRsp),
    DeviceListRsp(DeviceListRsp),
}

impl MasterToBackend {
    pub const SLAVE_CFG: u8 = 0x00;
    pub const MODE_CFG: u8 = 0x01;
    pub const RST: u8 = 0x02;
    pub const CTRL: u8 = 0x03;
    pub const DEVICE_LIST_RSP: u8 = 0x04;

    pub fn message_id(&self) -> u8 {
        match self {
            Self::SlaveCfg(_) => Self::SLAVE_CFG,
            Self::ModeCfg(_) => Self::MODE_CFG,
            Self::Rst(_) => Self::RST,
            Self::Ctrl(_) => Self::CTRL,
            Self::DeviceListRsp(_) => Self::DEVICE_LIST_RSP,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SlaveCfg(_) => "SlaveCfgRsp",
            Self::ModeCfg(_) => "ModeCfgRsp",
            Self::Rst(_) => "RstRsp",
            Self::Ctrl(_) => "CtrlRsp",
            Self::DeviceListRsp(_) => "DeviceListRsp",
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::SlaveCfg(m) => m.encode(dst),
            Self::ModeCfg(m) => m.encode(dst),
            Self::Rst(m) => m.encode(dst),
            Self::Ctrl(m) => m.encode(dst),
            Self::DeviceListRsp(m) => m.encode(dst),
        }
    }

    pub fn decode(message_id: u8, body: &[u8]) -> Result<Self> {
        match message_id {
            Self::SLAVE_CFG => SlaveCfgRsp::read(body).map(Self::SlaveCfg),
            Self::MODE_CFG => ModeCfgRsp::read(body).map(Self::ModeCfg),
            Self::RST => ResetRsp::read(body).map(Self::Rst),
            Self::CTRL => CtrlRsp::read(body).map(Self::Ctrl),
            Self::DEVICE_LIST_RSP => DeviceListRsp::read(body).map(Self::DeviceListRsp),
            other => Err(ProtocolError::UnknownMessage {
                direction: Direction::MasterToBackend,
                message_id: other,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, cond: u8) -> SlaveCfgEntry {
        SlaveCfgEntry {
            id: DeviceId(id),
            conduction_num: cond,
            resistance_num: 0,
            clip_mode: 1,
            clip_status: 0x00FF,
        }
    }

    #[test]
    fn slave_cfg_layout_is_count_prefixed() {
        let message = BackendToMaster::SlaveCfg(SlaveCfg {
            entries: vec![entry(0x0403_0201, 2), entry(0x0807_0605, 3)],
        });
        let mut body = BytesMut::new();
        message.encode(&mut body).expect("encode");

        assert_eq!(body.len(), 1 + 2 * 9);
        assert_eq!(body[0], 2);
        assert_eq!(&body[1..10], &[1, 2, 3, 4, 2, 0, 1, 0xFF, 0x00]);

        let back = BackendToMaster::decode(BackendToMaster::SLAVE_CFG, &body).expect("decode");
        assert_eq!(back, message);
    }

    #[test]
    fn count_larger_than_body_is_rejected() {
        let err = BackendToMaster::decode(BackendToMaster::SLAVE_CFG, &[3, 1, 2, 3, 4, 1, 0, 0, 0, 0])
            .expect_err("short");
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn backend_variants_survive_encode_decode() {
        for message in [
            BackendToMaster::ModeCfg(ModeCfg { mode: 1 }),
            BackendToMaster::Ctrl(Ctrl { running_status: 1 }),
            BackendToMaster::DeviceListReq(DeviceListReq::default()),
            BackendToMaster::Rst(ResetCmd {
                entries: vec![ResetEntry {
                    id: DeviceId(7),
                    lock: 1,
                    clip_status: 0x0102,
                }],
            }),
        ] {
            let mut body = BytesMut::new();
            message.encode(&mut body).expect("encode");
            let back = BackendToMaster::decode(message.message_id(), &body).expect("decode");
            assert_eq!(back, message);
        }
    }

    #[test]
    fn master_to_backend_variants_survive_encode_decode() {
        for message in [
            MasterToBackend::SlaveCfg(SlaveCfgRsp {
                status: STATUS_FAILURE,
                entries: vec![entry(9, 1)],
            }),
            MasterToBackend::ModeCfg(ModeCfgRsp {
                status: STATUS_SUCCESS,
                mode: 2,
            }),
            MasterToBackend::Rst(ResetRsp::default()),
            MasterToBackend::Ctrl(CtrlRsp {
                status: STATUS_SUCCESS,
                running_status: 0,
            }),
            MasterToBackend::DeviceListRsp(DeviceListRsp {
                entries: vec![DeviceListEntry {
                    id: DeviceId(0xA1B2_C3D4),
                    short_id: 3,
                    online: true,
                    version_major: 1,
                    version_minor: 2,
                    version_patch: 300,
                }],
            }),
        ] {
            let mut body = BytesMut::new();
            message.encode(&mut body).expect("encode");
            let back = MasterToBackend::decode(message.message_id(), &body).expect("decode");
            assert_eq!(back, message);
        }
    }

    #[test]
    fn too_many_entries_fail_to_encode() {
        let message = BackendToMaster::SlaveCfg(SlaveCfg {
            entries: vec![entry(1, 1); 256],
        });
        let mut body = BytesMut::new();
        let err = message.encode(&mut body).expect_err("too many");
        assert!(matches!(err, ProtocolError::TooLong { .. }));
    }
}
