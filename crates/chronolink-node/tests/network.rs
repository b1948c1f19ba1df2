//! Backend requests driven through the orchestrator to simulated slaves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chronolink_node::{
    forward_queue, BackendInterface, ChannelConfig, DeviceOrchestrator, OrchestratorConfig,
    ReliableCommandChannel, SlaveBus, SlaveNode, Uplink,
};
use chronolink_protocol::message::SlaveToBackend;
use chronolink_protocol::{DeviceId, FrameParser, Message};
use chronolink_transport::{MemoryTransport, StagedTransmitter, Transport};
use serde_json::Value;

const A: &str = "37-32-48-5B";
const B: &str = "01-02-03-04";
const C: &str = "0A-0B-0C-0D";

struct Rig {
    backend: BackendInterface,
    host: MemoryTransport,
    orchestrator: JoinHandle<chronolink_node::Result<()>>,
    bus: JoinHandle<SlaveBus>,
    shutdown: Arc<AtomicBool>,
}

impl Rig {
    fn start(slaves: &[&str], config: OrchestratorConfig) -> Self {
        let (master, mut medium) = MemoryTransport::pair();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let mut bus = SlaveBus::new(
            slaves
                .iter()
                .map(|id| SlaveNode::new(id.parse().expect("device id")))
                .collect(),
        );
        let bus = thread::spawn(move || {
            bus.serve(&mut medium, &flag).expect("slave bus");
            bus
        });

        let (uplink, host) = MemoryTransport::pair();
        let uplink: Uplink = Arc::new(StagedTransmitter::new(Box::new(uplink) as Box<dyn Transport>));
        let channel = ReliableCommandChannel::with_config(
            master,
            ChannelConfig {
                response_timeout: Duration::from_millis(100),
                retry_times: 2,
                slot: 0,
            },
        );
        let (forwarder, receiver) = forward_queue(config.queue_capacity);
        let orchestrator = DeviceOrchestrator::new(channel, config.clone())
            .with_uplink(uplink)
            .spawn(receiver)
            .expect("spawn orchestrator");

        Self {
            backend: BackendInterface::new(forwarder, config),
            host,
            orchestrator,
            bus,
            shutdown,
        }
    }

    fn request(&self, json: &str) -> Value {
        serde_json::from_str(&self.backend.handle_json(json)).expect("response json")
    }

    fn stop(self) -> SlaveBus {
        drop(self.backend);
        self.orchestrator
            .join()
            .expect("orchestrator thread")
            .expect("orchestrator result");
        self.shutdown.store(true, Ordering::Relaxed);
        self.bus.join().expect("bus thread")
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        forward_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    }
}

#[test]
fn configure_then_query_and_reset() {
    let rig = Rig::start(&[A, B], config());

    let conf = rig.request(&format!(
        r#"{{"inst":"DEV_CONF","params":[{{"id":"{A}","cond":2}},{{"id":"{B}","cond":6,"Z":2}}]}}"#
    ));
    assert_eq!(conf["status"], "OK", "{conf}");

    let query = rig.request(r#"{"inst":"DEV_QUERY","params":["*"]}"#);
    assert_eq!(query["status"], "OK", "{query}");

    let missing = rig.request(r#"{"inst":"DEV_QUERY","params":["AA-BB-CC-DD"]}"#);
    assert_eq!(missing["status"], "ERROR");
    assert_eq!(missing["result"]["id"][0], "AA-BB-CC-DD");

    let reset = rig.request(&format!(
        r#"{{"inst":"DEV_RESET","params":[{{"id":"{B}","lock":1,"clip":"0x0003"}}]}}"#
    ));
    assert_eq!(reset["status"], "OK", "{reset}");

    let bus = rig.stop();
    let b = bus.node(B.parse().expect("id")).expect("node b");
    let cond = b.cond_cfg().expect("cond cfg");
    assert_eq!(
        (cond.time_slot, cond.start_conduction_num, cond.total_conduction_num),
        (1, 2, 8)
    );
    assert_eq!(b.res_cfg().map(|res| res.resistance_num), Some(2));
    assert_eq!(b.lock(), 1);
    assert!(bus
        .node(A.parse().expect("id"))
        .expect("node a")
        .res_cfg()
        .is_none());
}

#[test]
fn batch_configuration_lays_pins_out_back_to_back() {
    let rig = Rig::start(&[A, B, C], config());
    let conf = rig.request(&format!(
        r#"{{"inst":"DEV_CONF","params":[{{"id":"{A}","cond":2}},{{"id":"{B}","cond":3}},{{"id":"{C}","cond":5}}]}}"#
    ));
    assert_eq!(conf["status"], "OK", "{conf}");

    let bus = rig.stop();
    let stored: Vec<_> = [A, B, C]
        .iter()
        .map(|id| {
            *bus.node(id.parse().expect("id"))
                .expect("node")
                .cond_cfg()
                .expect("cond cfg")
        })
        .collect();
    let layout: Vec<_> = stored
        .iter()
        .map(|cfg| {
            (
                cfg.time_slot,
                cfg.start_conduction_num,
                cfg.conduction_num,
                cfg.total_conduction_num,
            )
        })
        .collect();
    assert_eq!(layout, vec![(0, 0, 2, 10), (1, 2, 3, 10), (2, 5, 5, 10)]);

    // only the final device's pins reach the end of the harness
    let ends_harness: Vec<bool> = stored
        .iter()
        .map(|cfg| cfg.start_conduction_num + cfg.conduction_num == cfg.total_conduction_num)
        .collect();
    assert_eq!(ends_harness, vec![false, false, true]);
}

#[test]
fn partial_configuration_names_the_missing_device() {
    let rig = Rig::start(&[A], config());
    let conf = rig.request(&format!(
        r#"{{"inst":"DEV_CONF","params":[{{"id":"{A}","cond":2}},{{"id":"{B}","cond":3}}]}}"#
    ));
    assert_eq!(conf["status"], "ERROR");
    assert_eq!(conf["result"]["id"], serde_json::json!([B]));
    rig.stop();
}

#[test]
fn running_cycle_uploads_conduction_results() {
    let mut rig = Rig::start(
        &[A],
        OrchestratorConfig {
            conduction_interval: Duration::from_millis(5),
            sync_redundancy: Duration::from_millis(20),
            ..config()
        },
    );

    let ctrl = rig.request(r#"{"inst":"DEV_CTRL","ctrl":1}"#);
    assert_eq!(ctrl["status"], "ERROR", "no devices configured yet");

    assert_eq!(
        rig.request(&format!(
            r#"{{"inst":"DEV_CONF","params":[{{"id":"{A}","cond":4}}]}}"#
        ))["status"],
        "OK"
    );
    let ctrl = rig.request(r#"{"inst":"DEV_CTRL","ctrl":1}"#);
    assert_eq!(ctrl["status"], "OK");
    assert_eq!(ctrl["result"]["ctrl"], 1);

    let mode = rig.request(r#"{"inst":"DEV_MODE","mode":1}"#);
    assert_eq!(mode["status"], "ERROR", "mode is locked while running");

    let parser = FrameParser::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut report = None;
    while report.is_none() && Instant::now() < deadline {
        if let Some(bytes) = rig.host.receive(Duration::from_millis(50)).expect("uplink") {
            report = parser.parse(&bytes);
        }
    }
    let report = report.expect("a result upload");
    assert_eq!(report.device(), Some(A.parse::<DeviceId>().expect("id")));
    match report.message {
        Message::SlaveToBackend(SlaveToBackend::CondData(data)) => {
            // 4 pins starting at 0, one byte per row
            assert_eq!(data.data.as_ref(), &[0x01, 0x02, 0x04, 0x08]);
        }
        other => panic!("unexpected upload {other:?}"),
    }

    let stop = rig.request(r#"{"inst":"DEV_CTRL","ctrl":0}"#);
    assert_eq!(stop["status"], "OK");
    let bus = rig.stop();
    assert!(bus
        .node(A.parse().expect("id"))
        .expect("node")
        .last_sync()
        .is_some());
}
