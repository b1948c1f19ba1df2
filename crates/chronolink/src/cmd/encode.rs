use bytes::BytesMut;
use chronolink_protocol::message::master_slave::{MasterToSlave, PingReq, Sync};
use chronolink_protocol::{Address, DeviceId, Message, PacketCodec};

use crate::cmd::EncodeCommand;
use crate::exit::{protocol_error, CliResult, SUCCESS};
use crate::output::{print_frame_bytes, OutputFormat};

pub fn run(command: EncodeCommand, format: OutputFormat) -> CliResult<i32> {
    let (message, address) = match command {
        EncodeCommand::Sync(args) => (
            MasterToSlave::Sync(Sync {
                mode: args.mode,
                timestamp: args.timestamp,
            }),
            Address::device(DeviceId::BROADCAST),
        ),
        EncodeCommand::Ping(args) => {
            let to: DeviceId = args
                .to
                .parse()
                .map_err(|err| protocol_error("invalid --to", err))?;
            (
                MasterToSlave::PingReq(PingReq {
                    sequence: args.sequence,
                    timestamp: args.timestamp,
                }),
                Address::device(to),
            )
        }
    };

    let mut frame = BytesMut::new();
    PacketCodec::pack_frame(&Message::from(message), address, &mut frame)
        .map_err(|err| protocol_error("encode failed", err))?;
    print_frame_bytes(&frame, format);
    Ok(SUCCESS)
}
