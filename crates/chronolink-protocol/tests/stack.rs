//! Messages carried through link framing and back out of the parser.

use bytes::{Bytes, BytesMut};
use chronolink_frame::{LinkFramer, COMMAND, MAX_CHUNK, REPLY, SYNC};
use chronolink_protocol::message::master_slave::{CondCfg, MasterToSlave, Sync as SyncMsg};
use chronolink_protocol::message::upload::{SlaveToBackend, UploadData};
use chronolink_protocol::{Address, DeviceId, DeviceStatus, FrameParser, Message, PacketCodec};

fn link_bytes(framer: &LinkFramer, kind: u8, message: impl Into<Message>, address: Address) -> Vec<u8> {
    let mut frame = BytesMut::new();
    PacketCodec::pack_frame(&message.into(), address, &mut frame).expect("pack");
    let mut wire = BytesMut::new();
    framer.encode(0, kind, &frame, &mut wire).expect("link encode");
    wire.to_vec()
}

#[test]
fn command_survives_byte_at_a_time_delivery() {
    let mut framer = LinkFramer::new();
    let slave = DeviceId(0x5B48_3237);
    let cfg = CondCfg {
        time_slot: 1,
        interval: 10,
        total_conduction_num: 64,
        start_conduction_num: 16,
        conduction_num: 8,
    };
    let wire = link_bytes(&framer, COMMAND, MasterToSlave::CondCfg(cfg), Address::device(slave));

    let mut frames = Vec::new();
    for byte in [0x00u8, 0x13, 0xAB].iter().chain(wire.iter()) {
        frames.extend(framer.feed(std::slice::from_ref(byte)));
    }
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, COMMAND);

    let envelope = FrameParser::for_device(slave)
        .parse(&frames[0].payload)
        .expect("cond cfg");
    assert_eq!(envelope.message, Message::MasterToSlave(MasterToSlave::CondCfg(cfg)));
    assert_eq!(envelope.device(), Some(slave));
}

#[test]
fn large_upload_is_fragmented_and_reassembled() {
    let mut framer = LinkFramer::new();
    let data: Bytes = (0..900u32).map(|i| (i % 251) as u8).collect::<Vec<_>>().into();
    let address = Address::Slave {
        id: DeviceId(7),
        status: DeviceStatus(DeviceStatus::BATTERY_LOW),
    };
    let upload = SlaveToBackend::CondData(UploadData { data: data.clone() });
    let wire = link_bytes(&framer, REPLY, upload.clone(), address);
    assert!(wire.len() > 3 * MAX_CHUNK);

    let frames = framer.feed(&wire);
    assert_eq!(frames.len(), 1);
    let envelope = FrameParser::new().parse(&frames[0].payload).expect("upload");
    assert_eq!(envelope.message, Message::SlaveToBackend(upload));
    assert_eq!(envelope.address, address);
}

#[test]
fn broadcast_reaches_every_slave_and_misaddressed_is_dropped() {
    let mut framer = LinkFramer::new();
    let sync = MasterToSlave::Sync(SyncMsg {
        mode: 1,
        timestamp: 0x0102_0304,
    });
    let mut wire = link_bytes(&framer, SYNC, sync, Address::device(DeviceId::BROADCAST));
    wire.extend(link_bytes(
        &framer,
        COMMAND,
        MasterToSlave::CondCfg(CondCfg::default()),
        Address::device(DeviceId(2)),
    ));

    let frames = framer.feed(&wire);
    assert_eq!(frames.len(), 2);

    let parser = FrameParser::for_device(DeviceId(1));
    let parsed: Vec<_> = frames.iter().filter_map(|f| parser.parse(&f.payload)).collect();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].message.name(), "Sync");
}
