use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chronolink_node::{SlaveBus, SlaveNode};
use chronolink_protocol::DeviceId;
use chronolink_transport::UnixDomainSocket;
use tracing::info;

use crate::cmd::SlaveArgs;
use crate::exit::{node_error, protocol_error, transport_error, CliError, CliResult, SUCCESS};

pub fn run(args: SlaveArgs) -> CliResult<i32> {
    let nodes = args
        .ids
        .iter()
        .map(|id| {
            id.parse::<DeviceId>()
                .map(SlaveNode::new)
                .map_err(|err| protocol_error("invalid --id", err))
        })
        .collect::<CliResult<Vec<_>>>()?;
    let mut bus = SlaveBus::new(nodes);

    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(shutdown.clone())?;

    while !shutdown.load(Ordering::SeqCst) {
        let mut link = socket
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        info!(devices = bus.nodes().len(), "master attached");

        bus.serve(&mut link, &shutdown)
            .map_err(|err| node_error("slave bus failed", err))?;
    }

    for node in bus.nodes() {
        info!(device = %node.id(), lock = node.lock(), "slave stopped");
    }
    Ok(SUCCESS)
}

fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
