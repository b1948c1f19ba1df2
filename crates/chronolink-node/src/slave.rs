//! Simulated slave devices.
//!
//! A [`SlaveNode`] answers Master->Slave commands the way harness test
//! hardware does. A [`SlaveBus`] puts several nodes on one shared link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chronolink_frame::{FrameConfig, LinkFramer, MAX_CHUNK, MAX_FRAGMENTS, REPLY};
use chronolink_protocol::message::master_slave::{ClipCfg, CondCfg, ResCfg, Sync as SyncMsg};
use chronolink_protocol::message::slave_master::{
    ClipInfo, CondInfo, PingRsp, ResInfo, RstAck, STATUS_INVALID_CFG, STATUS_OK,
};
use chronolink_protocol::message::upload::{UploadClip, UploadData};
use chronolink_protocol::message::{MasterToSlave, SlaveToBackend, SlaveToMaster};
use chronolink_protocol::{
    Address, DeviceId, DeviceStatus, Envelope, FrameParser, Message, PacketCodec,
    FRAME_HEADER_SIZE,
};
use chronolink_transport::{Transport, TransportError};
use tracing::{debug, info, trace, warn};

use crate::error::{NodeError, Result};

/// Largest data report that fits one link frame at the default chunk size:
/// protocol header, message id, slave id, device status and length prefix
/// come off the fragment budget.
pub const MAX_REPORT_LEN: usize =
    MAX_CHUNK * MAX_FRAGMENTS - (FRAME_HEADER_SIZE + 1 + 4 + 2 + 2);

/// One simulated slave.
#[derive(Debug, Clone)]
pub struct SlaveNode {
    id: DeviceId,
    status: DeviceStatus,
    parser: FrameParser,
    cond: Option<CondCfg>,
    res: Option<ResCfg>,
    clip: Option<ClipCfg>,
    lock: u8,
    clip_led: u16,
    last_sync: Option<SyncMsg>,
}

impl SlaveNode {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            status: DeviceStatus::default(),
            parser: FrameParser::for_device(id),
            cond: None,
            res: None,
            clip: None,
            lock: 0,
            clip_led: 0,
            last_sync: None,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn set_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }

    pub fn cond_cfg(&self) -> Option<&CondCfg> {
        self.cond.as_ref()
    }

    pub fn res_cfg(&self) -> Option<&ResCfg> {
        self.res.as_ref()
    }

    pub fn clip_cfg(&self) -> Option<&ClipCfg> {
        self.clip.as_ref()
    }

    pub fn last_sync(&self) -> Option<&SyncMsg> {
        self.last_sync.as_ref()
    }

    pub fn lock(&self) -> u8 {
        self.lock
    }

    /// Apply a decoded message; returns the reply, if any.
    ///
    /// Commands addressed to the broadcast id are applied but never
    /// answered, so slaves sharing a medium do not talk over each other.
    pub fn process(&mut self, envelope: &Envelope) -> Option<(Message, Address)> {
        let Message::MasterToSlave(command) = &envelope.message else {
            return None;
        };
        let addressed = envelope.device() == Some(self.id);

        let reply: Message = match *command {
            MasterToSlave::Sync(sync) => {
                trace!(device = %self.id, mode = sync.mode, "sync recorded");
                self.last_sync = Some(sync);
                return None;
            }
            MasterToSlave::CondCfg(cfg) => {
                let len = conduction_report_len(&cfg);
                let status = if len <= MAX_REPORT_LEN {
                    self.cond = Some(cfg);
                    STATUS_OK
                } else {
                    warn!(
                        device = %self.id,
                        len,
                        max = MAX_REPORT_LEN,
                        "conduction config rejected"
                    );
                    STATUS_INVALID_CFG
                };
                SlaveToMaster::CondInfo(CondInfo { status, cfg }).into()
            }
            MasterToSlave::ResCfg(cfg) => {
                let len = usize::from(cfg.resistance_num) * 2;
                let status = if len <= MAX_REPORT_LEN {
                    self.res = Some(cfg);
                    STATUS_OK
                } else {
                    warn!(
                        device = %self.id,
                        len,
                        max = MAX_REPORT_LEN,
                        "resistance config rejected"
                    );
                    STATUS_INVALID_CFG
                };
                SlaveToMaster::ResInfo(ResInfo { status, cfg }).into()
            }
            MasterToSlave::ClipCfg(cfg) => {
                self.clip = Some(cfg);
                SlaveToMaster::ClipInfo(ClipInfo {
                    status: STATUS_OK,
                    cfg,
                })
                .into()
            }
            MasterToSlave::ReadCondData(_) => SlaveToBackend::CondData(UploadData {
                data: self.conduction_bitmap(),
            })
            .into(),
            MasterToSlave::ReadResData(_) => SlaveToBackend::ResData(UploadData {
                data: self.resistance_readings(),
            })
            .into(),
            MasterToSlave::ReadClipData(_) => SlaveToBackend::ClipData(UploadClip {
                clip_data: self.clip.map_or(0, |clip| clip.clip_pin),
            })
            .into(),
            MasterToSlave::Rst(rst) => {
                self.lock = rst.lock;
                self.clip_led = rst.clip_led;
                SlaveToMaster::Rst(RstAck {
                    status: STATUS_OK,
                    lock_status: self.lock,
                    clip_led: self.clip_led,
                })
                .into()
            }
            MasterToSlave::PingReq(ping) => SlaveToMaster::PingRsp(PingRsp {
                sequence: ping.sequence,
                timestamp: ping.timestamp,
            })
            .into(),
        };

        if !addressed {
            return None;
        }
        let address = match reply {
            Message::SlaveToBackend(_) => Address::Slave {
                id: self.id,
                status: self.status,
            },
            _ => Address::device(self.id),
        };
        Some((reply, address))
    }

    /// Parse one protocol frame and build the framed reply.
    pub fn respond(&mut self, frame: &[u8]) -> Result<Option<Bytes>> {
        let Some(envelope) = self.parser.parse(frame) else {
            return Ok(None);
        };
        let Some((reply, address)) = self.process(&envelope) else {
            return Ok(None);
        };
        debug!(
            device = %self.id,
            request = envelope.message.name(),
            reply = reply.name(),
            "answering"
        );
        let mut out = BytesMut::new();
        PacketCodec::pack_frame(&reply, address, &mut out)?;
        Ok(Some(out.freeze()))
    }

    /// Conduction result: one row per local pin, `ceil(total / 8)` bytes
    /// wide, with bit `start + row` set in row `row`.
    pub fn conduction_bitmap(&self) -> Bytes {
        let Some(cfg) = self.cond else {
            return Bytes::new();
        };
        let total = usize::from(cfg.total_conduction_num);
        let width = total.div_ceil(8);
        let rows = usize::from(cfg.conduction_num);
        if rows * width > MAX_REPORT_LEN {
            return Bytes::new();
        }
        let mut data = vec![0u8; rows * width];
        for row in 0..rows {
            let pin = usize::from(cfg.start_conduction_num) + row;
            if pin < total {
                data[row * width + pin / 8] |= 1 << (pin % 8);
            }
        }
        Bytes::from(data)
    }

    /// Resistance result: one little-endian u16 per local channel, each
    /// reporting the channel's global index.
    pub fn resistance_readings(&self) -> Bytes {
        let Some(cfg) = self.res else {
            return Bytes::new();
        };
        let mut data = Vec::with_capacity(usize::from(cfg.resistance_num) * 2);
        for channel in 0..cfg.resistance_num {
            let reading = cfg.start_resistance_num.saturating_add(channel);
            data.extend_from_slice(&reading.to_le_bytes());
        }
        Bytes::from(data)
    }
}

fn conduction_report_len(cfg: &CondCfg) -> usize {
    usize::from(cfg.conduction_num) * usize::from(cfg.total_conduction_num).div_ceil(8)
}

/// Several slaves sharing one link.
#[derive(Debug)]
pub struct SlaveBus {
    nodes: Vec<SlaveNode>,
    framer: LinkFramer,
    slot: u8,
}

impl SlaveBus {
    pub fn new(nodes: Vec<SlaveNode>) -> Self {
        Self::with_config(nodes, FrameConfig::default())
    }

    pub fn with_config(nodes: Vec<SlaveNode>, config: FrameConfig) -> Self {
        Self {
            nodes,
            framer: LinkFramer::with_config(config),
            slot: 0,
        }
    }

    pub fn nodes(&self) -> &[SlaveNode] {
        &self.nodes
    }

    pub fn node(&self, id: DeviceId) -> Option<&SlaveNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: DeviceId) -> Option<&mut SlaveNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Feed received link bytes; returns link-framed replies to transmit.
    ///
    /// A reply that cannot be built or framed is dropped for that node only.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Vec<BytesMut> {
        let mut out = Vec::new();
        for frame in self.framer.feed(bytes) {
            for node in &mut self.nodes {
                let reply = match node.respond(&frame.payload) {
                    Ok(Some(reply)) => reply,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(device = %node.id, error = %err, "reply dropped");
                        continue;
                    }
                };
                let mut wire = BytesMut::new();
                match self.framer.encode(self.slot, REPLY, &reply, &mut wire) {
                    Ok(_) => out.push(wire),
                    Err(err) => warn!(device = %node.id, error = %err, "reply dropped"),
                }
            }
        }
        out
    }

    /// Answer traffic on `link` until `shutdown` is set or the peer leaves.
    pub fn serve<T: Transport>(&mut self, link: &mut T, shutdown: &AtomicBool) -> Result<()> {
        info!(devices = self.nodes.len(), "slave bus serving");
        while !shutdown.load(Ordering::Relaxed) {
            let bytes = match link.receive(Duration::from_millis(50)) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(TransportError::Disconnected) => {
                    info!("master disconnected");
                    return Ok(());
                }
                Err(err) => return Err(NodeError::Transport(err)),
            };
            for reply in self.handle_bytes(&bytes) {
                link.transmit(&reply)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chronolink_frame::COMMAND;
    use chronolink_protocol::message::master_slave::{PingReq, ReadData, Rst};
    use chronolink_protocol::Direction;

    use super::*;

    fn envelope(message: MasterToSlave, to: DeviceId) -> Envelope {
        Envelope::new(Address::device(to), message)
    }

    fn cond(total: u16, start: u16, count: u16) -> CondCfg {
        CondCfg {
            time_slot: 0,
            interval: 10,
            total_conduction_num: total,
            start_conduction_num: start,
            conduction_num: count,
        }
    }

    #[test]
    fn cfg_is_echoed_and_stored() {
        let id = DeviceId(1);
        let mut node = SlaveNode::new(id);
        let cfg = cond(10, 2, 3);
        let (reply, address) = node
            .process(&envelope(MasterToSlave::CondCfg(cfg), id))
            .expect("reply");
        assert_eq!(
            reply,
            Message::SlaveToMaster(SlaveToMaster::CondInfo(CondInfo {
                status: STATUS_OK,
                cfg
            }))
        );
        assert_eq!(address, Address::device(id));
        assert_eq!(node.cond_cfg(), Some(&cfg));
    }

    #[test]
    fn bitmap_has_one_row_per_pin() {
        let mut node = SlaveNode::new(DeviceId(1));
        node.process(&envelope(MasterToSlave::CondCfg(cond(10, 2, 3)), DeviceId(1)));
        let bitmap = node.conduction_bitmap();
        // width 2 bytes, rows for pins 2, 3, 4
        assert_eq!(bitmap.as_ref(), &[0x04, 0x00, 0x08, 0x00, 0x10, 0x00]);

        node.process(&envelope(MasterToSlave::CondCfg(cond(16, 8, 1)), DeviceId(1)));
        assert_eq!(node.conduction_bitmap().as_ref(), &[0x00, 0x01]);
    }

    #[test]
    fn read_data_goes_to_backend_with_status() {
        let id = DeviceId(4);
        let mut node = SlaveNode::new(id);
        node.set_status(DeviceStatus(DeviceStatus::LOCK_1));
        node.process(&envelope(MasterToSlave::CondCfg(cond(8, 0, 2)), id));

        let (reply, address) = node
            .process(&envelope(
                MasterToSlave::ReadCondData(ReadData::default()),
                id,
            ))
            .expect("report");
        assert_eq!(reply.direction(), Direction::SlaveToBackend);
        assert_eq!(
            address,
            Address::Slave {
                id,
                status: DeviceStatus(DeviceStatus::LOCK_1)
            }
        );
    }

    #[test]
    fn reset_and_ping_are_acknowledged() {
        let id = DeviceId(4);
        let mut node = SlaveNode::new(id);
        let (reply, _) = node
            .process(&envelope(
                MasterToSlave::Rst(Rst {
                    lock: 1,
                    clip_led: 0x00F0,
                }),
                id,
            ))
            .expect("rst ack");
        assert_eq!(
            reply,
            Message::SlaveToMaster(SlaveToMaster::Rst(RstAck {
                status: STATUS_OK,
                lock_status: 1,
                clip_led: 0x00F0
            }))
        );
        assert_eq!(node.lock(), 1);

        let (reply, _) = node
            .process(&envelope(
                MasterToSlave::PingReq(PingReq {
                    sequence: 3,
                    timestamp: 99,
                }),
                id,
            ))
            .expect("pong");
        assert_eq!(
            reply,
            Message::SlaveToMaster(SlaveToMaster::PingRsp(PingRsp {
                sequence: 3,
                timestamp: 99
            }))
        );
    }

    #[test]
    fn sync_and_broadcast_get_no_reply() {
        let mut node = SlaveNode::new(DeviceId(1));
        let sync = SyncMsg {
            mode: 2,
            timestamp: 10,
        };
        assert!(node
            .process(&envelope(MasterToSlave::Sync(sync), DeviceId::BROADCAST))
            .is_none());
        assert_eq!(node.last_sync(), Some(&sync));

        assert!(node
            .process(&envelope(
                MasterToSlave::CondCfg(cond(4, 0, 4)),
                DeviceId::BROADCAST
            ))
            .is_none());
        assert!(node.cond_cfg().is_some());
    }

    #[test]
    fn bus_answers_only_the_addressed_node() {
        let mut bus = SlaveBus::new(vec![SlaveNode::new(DeviceId(1)), SlaveNode::new(DeviceId(2))]);
        let mut frame = BytesMut::new();
        PacketCodec::pack_frame(
            &MasterToSlave::PingReq(PingReq {
                sequence: 1,
                timestamp: 0,
            })
            .into(),
            Address::device(DeviceId(2)),
            &mut frame,
        )
        .expect("pack");
        let mut wire = BytesMut::new();
        LinkFramer::new()
            .encode(0, COMMAND, &frame, &mut wire)
            .expect("link");

        let replies = bus.handle_bytes(&wire);
        assert_eq!(replies.len(), 1);

        let frames = LinkFramer::new().feed(&replies[0]);
        let reply = FrameParser::new().parse(&frames[0].payload).expect("reply");
        assert_eq!(reply.device(), Some(DeviceId(2)));
        assert_eq!(frames[0].kind, REPLY);
    }

    fn command_wire(framer: &LinkFramer, message: MasterToSlave, to: DeviceId) -> BytesMut {
        let mut frame = BytesMut::new();
        PacketCodec::pack_frame(&message.into(), Address::device(to), &mut frame).expect("pack");
        let mut wire = BytesMut::new();
        framer.encode(0, COMMAND, &frame, &mut wire).expect("link");
        wire
    }

    fn decode_replies(framer: &mut LinkFramer, replies: &[BytesMut]) -> Vec<Envelope> {
        replies
            .iter()
            .flat_map(|wire| framer.feed(wire))
            .map(|frame| FrameParser::new().parse(&frame.payload).expect("reply"))
            .collect()
    }

    fn ping(sequence: u16) -> MasterToSlave {
        MasterToSlave::PingReq(PingReq {
            sequence,
            timestamp: 0,
        })
    }

    #[test]
    fn oversized_conduction_config_is_refused_and_bus_keeps_serving() {
        let (a, b) = (DeviceId(1), DeviceId(2));
        let mut bus = SlaveBus::new(vec![SlaveNode::new(a), SlaveNode::new(b)]);
        let framer = LinkFramer::new();

        // 720 rows of 90 bytes would not fit one link frame
        let replies = bus.handle_bytes(&command_wire(
            &framer,
            MasterToSlave::CondCfg(cond(720, 0, 720)),
            a,
        ));
        let acks = decode_replies(&mut LinkFramer::new(), &replies);
        assert_eq!(acks.len(), 1);
        match &acks[0].message {
            Message::SlaveToMaster(SlaveToMaster::CondInfo(info)) => {
                assert_eq!(info.status, STATUS_INVALID_CFG);
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(bus.node(a).expect("node a").cond_cfg().is_none());

        let mut wire = command_wire(
            &framer,
            MasterToSlave::ReadCondData(ReadData::default()),
            a,
        );
        wire.extend_from_slice(&command_wire(&framer, ping(9), b));
        let answers = decode_replies(&mut LinkFramer::new(), &bus.handle_bytes(&wire));
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].device(), Some(a));
        assert_eq!(answers[1].device(), Some(b));
        assert_eq!(answers[1].message.name(), "PingRsp");
    }

    #[test]
    fn unframeable_reply_is_dropped_for_that_node_only() {
        let (a, b) = (DeviceId(1), DeviceId(2));
        let config = FrameConfig {
            max_chunk: 8,
            ..FrameConfig::default()
        };
        let nodes = vec![SlaveNode::new(a), SlaveNode::new(b)];
        let mut bus = SlaveBus::with_config(nodes, config.clone());
        bus.node_mut(a)
            .expect("node a")
            .process(&envelope(MasterToSlave::CondCfg(cond(200, 0, 100)), a))
            .expect("cfg ack");

        // a 2500-byte bitmap needs more than 256 chunks of 8 bytes
        let framer = LinkFramer::with_config(config.clone());
        let mut wire = command_wire(
            &framer,
            MasterToSlave::ReadCondData(ReadData::default()),
            a,
        );
        wire.extend_from_slice(&command_wire(&framer, ping(4), b));

        let replies = bus.handle_bytes(&wire);
        let answers = decode_replies(&mut LinkFramer::with_config(config), &replies);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].device(), Some(b));
        assert_eq!(
            answers[0].message,
            Message::SlaveToMaster(SlaveToMaster::PingRsp(PingRsp {
                sequence: 4,
                timestamp: 0
            }))
        );
    }

    #[test]
    fn oversized_resistance_config_is_refused() {
        let id = DeviceId(3);
        let mut node = SlaveNode::new(id);
        let cfg = ResCfg {
            total_resistance_num: u16::MAX,
            resistance_num: u16::MAX,
            ..ResCfg::default()
        };
        let (reply, _) = node
            .process(&envelope(MasterToSlave::ResCfg(cfg), id))
            .expect("reply");
        assert_eq!(
            reply,
            Message::SlaveToMaster(SlaveToMaster::ResInfo(ResInfo {
                status: STATUS_INVALID_CFG,
                cfg
            }))
        );
        assert!(node.res_cfg().is_none());
    }
}
