//! Backend-facing command surface.
//!
//! Requests arrive either as JSON (`{"inst": "DEV_CONF", "params": [...]}`)
//! or as binary Backend->Master protocol frames. Both become
//! [`DeviceCommand`]s on the forward queue; the outcome is answered in the
//! same form the request came in.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chronolink_protocol::message::backend::{
    CtrlRsp, DeviceListRsp, ModeCfgRsp, ResetEntry, ResetRsp, SlaveCfgEntry, SlaveCfgRsp,
    STATUS_FAILURE, STATUS_SUCCESS,
};
use chronolink_protocol::message::{BackendToMaster, MasterToBackend};
use chronolink_protocol::{Address, DeviceId, FrameParser, Message, PacketCodec};
use chronolink_transport::{StagedTransmitter, Transport};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::command::{
    ClipSetup, CommandOutcome, DeviceCommand, DeviceReset, DeviceSetup, QueryTarget, RunState,
    TestMode,
};
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::forward::Forwarder;

/// Shared, staged link to the Backend.
pub type Uplink = Arc<StagedTransmitter<Box<dyn Transport>>>;

pub const DEV_CONF: &str = "DEV_CONF";
pub const DEV_MODE: &str = "DEV_MODE";
pub const DEV_CTRL: &str = "DEV_CTRL";
pub const DEV_RESET: &str = "DEV_RESET";
pub const DEV_QUERY: &str = "DEV_QUERY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// JSON answer to one Backend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub status: ResponseStatus,
    pub result: ResponseResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseResult {
    pub inst: String,
    /// Devices that failed or could not be reached.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctrl: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendResponse {
    pub fn error(inst: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: ResponseResult {
                inst: inst.into(),
                error: Some(message.into()),
                ..ResponseResult::default()
            },
        }
    }

    fn from_outcome(inst: &str, outcome: &CommandOutcome) -> Self {
        let success = outcome.is_success();
        let mut result = ResponseResult {
            inst: inst.to_string(),
            id: outcome.failed_ids().iter().map(DeviceId::to_string).collect(),
            ..ResponseResult::default()
        };
        match outcome {
            CommandOutcome::Mode { mode, .. } if success => result.mode = Some(mode.as_u8()),
            CommandOutcome::Control { state, .. } if success => {
                result.ctrl = Some(state.as_u8());
            }
            _ => {}
        }
        Self {
            status: if success {
                ResponseStatus::Ok
            } else {
                ResponseStatus::Error
            },
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"status":"ERROR","result":{{"inst":"","error":"{err}"}}}}"#)
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "inst")]
enum Request {
    #[serde(rename = "DEV_CONF")]
    Configure { params: Vec<ConfParam> },
    #[serde(rename = "DEV_MODE")]
    Mode { mode: u8 },
    #[serde(rename = "DEV_CTRL")]
    Control { ctrl: u8 },
    #[serde(rename = "DEV_RESET")]
    Reset { params: Vec<ResetParam> },
    #[serde(rename = "DEV_QUERY")]
    Query {
        #[serde(default)]
        params: Vec<String>,
        #[serde(default)]
        id: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ConfParam {
    id: DeviceId,
    #[serde(default)]
    cond: u16,
    #[serde(default, rename = "Z")]
    resistance: u16,
    #[serde(default)]
    clip: Option<ClipParam>,
}

#[derive(Debug, Deserialize)]
struct ClipParam {
    #[serde(default)]
    mode: u8,
    #[serde(default, deserialize_with = "hex_u16")]
    pin: u16,
}

#[derive(Debug, Deserialize)]
struct ResetParam {
    id: DeviceId,
    #[serde(default)]
    lock: u8,
    #[serde(default, deserialize_with = "hex_u16")]
    clip: u16,
}

/// Accepts `"0x00FF"`, `"00FF"` or a plain number.
fn hex_u16<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrNumber {
        Number(u16),
        Text(String),
    }

    match HexOrNumber::deserialize(deserializer)? {
        HexOrNumber::Number(value) => Ok(value),
        HexOrNumber::Text(text) => {
            let digits = text
                .trim()
                .trim_start_matches("0x")
                .trim_start_matches("0X");
            u16::from_str_radix(digits, 16)
                .map_err(|_| serde::de::Error::custom(format!("invalid hex value {text:?}")))
        }
    }
}

impl Request {
    fn into_command(self) -> std::result::Result<DeviceCommand, String> {
        Ok(match self {
            Request::Configure { params } => DeviceCommand::Configure {
                devices: params
                    .into_iter()
                    .map(|param| DeviceSetup {
                        id: param.id,
                        conduction_num: param.cond,
                        resistance_num: param.resistance,
                        clip: param.clip.map(|clip| ClipSetup {
                            mode: clip.mode,
                            pin: clip.pin,
                        }),
                    })
                    .collect(),
            },
            Request::Mode { mode } => DeviceCommand::Mode {
                mode: TestMode::from_u8(mode).ok_or_else(|| format!("unknown mode {mode}"))?,
            },
            Request::Control { ctrl } => DeviceCommand::Control {
                state: RunState::from_u8(ctrl).ok_or_else(|| format!("unknown ctrl {ctrl}"))?,
            },
            Request::Reset { params } => DeviceCommand::Reset {
                devices: params
                    .into_iter()
                    .map(|param| DeviceReset {
                        id: param.id,
                        lock: param.lock,
                        clip_led: param.clip,
                    })
                    .collect(),
            },
            Request::Query { params, id } => {
                let ids: Vec<String> = params.into_iter().chain(id).collect();
                if ids.is_empty() || ids.iter().any(|id| id == "*") {
                    DeviceCommand::Query {
                        target: QueryTarget::All,
                    }
                } else {
                    let devices = ids
                        .iter()
                        .map(|id| id.parse::<DeviceId>().map_err(|err| err.to_string()))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    DeviceCommand::Query {
                        target: QueryTarget::Devices(devices),
                    }
                }
            }
        })
    }
}

/// Turns Backend requests into forwarded commands and answers them.
#[derive(Debug, Clone)]
pub struct BackendInterface {
    forwarder: Forwarder,
    config: OrchestratorConfig,
    uplink: Option<Uplink>,
}

impl BackendInterface {
    pub fn new(forwarder: Forwarder, config: OrchestratorConfig) -> Self {
        Self {
            forwarder,
            config,
            uplink: None,
        }
    }

    /// Send binary responses through `uplink`.
    pub fn with_uplink(mut self, uplink: Uplink) -> Self {
        self.uplink = Some(uplink);
        self
    }

    /// Forward one command and wait for its outcome.
    pub fn submit(&self, command: DeviceCommand) -> Result<CommandOutcome> {
        self.forwarder.submit(
            command,
            self.config.forward_queue_timeout,
            self.config.forward_timeout,
        )
    }

    /// Handle one JSON request and return the JSON response text.
    pub fn handle_json(&self, request: &str) -> String {
        match serde_json::from_str::<Value>(request) {
            Ok(value) => self.handle_value(value).to_json(),
            Err(err) => {
                warn!(error = %err, "malformed json request");
                BackendResponse::error("", format!("malformed request: {err}")).to_json()
            }
        }
    }

    /// Handle one decoded JSON request.
    pub fn handle_value(&self, request: Value) -> BackendResponse {
        let inst = request
            .get("inst")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let request: Request = match serde_json::from_value(request) {
            Ok(request) => request,
            Err(err) => {
                warn!(inst = %inst, error = %err, "invalid request");
                return BackendResponse::error(inst, err.to_string());
            }
        };
        let command = match request.into_command() {
            Ok(command) => command,
            Err(err) => {
                warn!(inst = %inst, error = %err, "invalid request");
                return BackendResponse::error(inst, err);
            }
        };

        debug!(inst = %inst, command = command.name(), "forwarding");
        match self.submit(command) {
            Ok(outcome) => {
                let response = BackendResponse::from_outcome(&inst, &outcome);
                info!(inst = %inst, ok = response.is_ok(), "request answered");
                response
            }
            Err(err) => {
                warn!(inst = %inst, error = %err, "forward failed");
                BackendResponse::error(inst, err.to_string())
            }
        }
    }

    /// Handle one binary protocol frame.
    ///
    /// Returns the framed Master->Backend reply, or `None` for frames that
    /// carry no Backend command.
    pub fn handle_frame(&self, frame: &[u8]) -> Result<Option<Bytes>> {
        let envelope = FrameParser::new().try_parse(frame)?;
        let Message::BackendToMaster(request) = envelope.message else {
            debug!(message = envelope.message.name(), "not a backend command; ignored");
            return Ok(None);
        };

        let reply = self.answer(request);
        let mut out = BytesMut::new();
        PacketCodec::pack_frame(&Message::MasterToBackend(reply), Address::None, &mut out)?;
        Ok(Some(out.freeze()))
    }

    /// Handle a binary frame and send the reply through the uplink.
    pub fn serve_frame(&self, frame: &[u8]) -> Result<()> {
        let Some(reply) = self.handle_frame(frame)? else {
            return Ok(());
        };
        if let Some(uplink) = &self.uplink {
            uplink.send(&reply, self.config.upload_access_timeout)?;
        }
        Ok(())
    }

    fn answer(&self, request: BackendToMaster) -> MasterToBackend {
        let status = |ok: bool| if ok { STATUS_SUCCESS } else { STATUS_FAILURE };
        match request {
            BackendToMaster::SlaveCfg(cfg) => {
                let devices = cfg
                    .entries
                    .iter()
                    .map(|entry| DeviceSetup {
                        id: entry.id,
                        conduction_num: u16::from(entry.conduction_num),
                        resistance_num: u16::from(entry.resistance_num),
                        clip: (entry.clip_status != 0).then_some(ClipSetup {
                            mode: entry.clip_mode,
                            pin: entry.clip_status,
                        }),
                    })
                    .collect();
                let failed = self.failed_devices(DeviceCommand::Configure { devices });
                MasterToBackend::SlaveCfg(SlaveCfgRsp {
                    status: status(matches!(&failed, Some(ids) if ids.is_empty())),
                    entries: select_entries(cfg.entries, failed.as_deref(), |e: &SlaveCfgEntry| e.id),
                })
            }
            BackendToMaster::ModeCfg(mode_cfg) => {
                let accepted = TestMode::from_u8(mode_cfg.mode).is_some_and(|mode| {
                    self.accepted(DeviceCommand::Mode { mode })
                });
                MasterToBackend::ModeCfg(ModeCfgRsp {
                    status: status(accepted),
                    mode: mode_cfg.mode,
                })
            }
            BackendToMaster::Rst(reset) => {
                let devices = reset
                    .entries
                    .iter()
                    .map(|entry| DeviceReset {
                        id: entry.id,
                        lock: entry.lock,
                        clip_led: entry.clip_status,
                    })
                    .collect();
                let failed = self.failed_devices(DeviceCommand::Reset { devices });
                MasterToBackend::Rst(ResetRsp {
                    status: status(matches!(&failed, Some(ids) if ids.is_empty())),
                    entries: select_entries(reset.entries, failed.as_deref(), |e: &ResetEntry| e.id),
                })
            }
            BackendToMaster::Ctrl(ctrl) => {
                let accepted = RunState::from_u8(ctrl.running_status).is_some_and(|state| {
                    self.accepted(DeviceCommand::Control { state })
                });
                MasterToBackend::Ctrl(CtrlRsp {
                    status: status(accepted),
                    running_status: ctrl.running_status,
                })
            }
            BackendToMaster::DeviceListReq(_) => {
                let entries = match self.submit(DeviceCommand::Query {
                    target: QueryTarget::All,
                }) {
                    Ok(CommandOutcome::Query { devices, .. }) => devices,
                    Ok(_) => Vec::new(),
                    Err(err) => {
                        warn!(error = %err, "device list query failed");
                        Vec::new()
                    }
                };
                MasterToBackend::DeviceListRsp(DeviceListRsp { entries })
            }
        }
    }

    /// Failed ids for a batch command; `None` when the command itself failed.
    fn failed_devices(&self, command: DeviceCommand) -> Option<Vec<DeviceId>> {
        match self.submit(command) {
            Ok(outcome) => Some(outcome.failed_ids().to_vec()),
            Err(err) => {
                warn!(error = %err, "forward failed");
                None
            }
        }
    }

    fn accepted(&self, command: DeviceCommand) -> bool {
        match self.submit(command) {
            Ok(outcome) => outcome.is_success(),
            Err(err) => {
                warn!(error = %err, "forward failed");
                false
            }
        }
    }
}

/// On success echo every entry; on failure only the failed ones.
fn select_entries<E>(entries: Vec<E>, failed: Option<&[DeviceId]>, id: impl Fn(&E) -> DeviceId) -> Vec<E> {
    match failed {
        Some([]) => entries,
        Some(failed) => entries
            .into_iter()
            .filter(|entry| failed.contains(&id(entry)))
            .collect(),
        None => entries,
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use chronolink_protocol::message::backend::{ModeCfg, SlaveCfg};
    use chronolink_transport::MemoryTransport;

    use super::*;
    use crate::forward::{forward_queue, ForwardReceiver};

    /// Answers every forwarded command with a canned outcome.
    fn fake_orchestrator(
        receiver: ForwardReceiver,
        answer: impl Fn(&DeviceCommand) -> CommandOutcome + Send + 'static,
    ) -> thread::JoinHandle<Vec<DeviceCommand>> {
        thread::spawn(move || {
            let mut seen = Vec::new();
            while let Ok(item) = receiver.pop(Duration::from_secs(2)) {
                let Some(item) = item else { break };
                let outcome = answer(&item.command);
                seen.push(item.command.clone());
                item.complete(outcome);
            }
            seen
        })
    }

    fn interface() -> (BackendInterface, ForwardReceiver) {
        let (forwarder, receiver) = forward_queue(10);
        let config = OrchestratorConfig {
            forward_timeout: Duration::from_secs(2),
            ..OrchestratorConfig::default()
        };
        (BackendInterface::new(forwarder, config), receiver)
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).expect("response json")
    }

    #[test]
    fn configure_reports_failed_ids() {
        let (backend, receiver) = interface();
        let worker = fake_orchestrator(receiver, |_| CommandOutcome::Configure {
            failed: vec![DeviceId::from_wire([0x37, 0x32, 0x48, 0x5B])],
        });

        let response = parse(&backend.handle_json(
            r#"{"inst":"DEV_CONF","params":[
                {"id":"37-32-48-5B","cond":4,"Z":0,"clip":{"mode":1,"pin":"0x00FF"}},
                {"id":"01-02-03-04","cond":8}
            ]}"#,
        ));
        assert_eq!(response["status"], "ERROR");
        assert_eq!(response["result"]["inst"], "DEV_CONF");
        assert_eq!(response["result"]["id"][0], "37-32-48-5B");

        drop(backend);
        let seen = worker.join().expect("worker");
        match &seen[0] {
            DeviceCommand::Configure { devices } => {
                assert_eq!(devices.len(), 2);
                assert_eq!(devices[0].clip, Some(ClipSetup { mode: 1, pin: 0x00FF }));
                assert_eq!(devices[1].conduction_num, 8);
                assert_eq!(devices[1].clip, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn mode_and_ctrl_are_echoed() {
        let (backend, receiver) = interface();
        let worker = fake_orchestrator(receiver, |command| match command {
            DeviceCommand::Mode { mode } => CommandOutcome::Mode {
                accepted: true,
                mode: *mode,
            },
            DeviceCommand::Control { state } => CommandOutcome::Control {
                accepted: true,
                state: *state,
            },
            _ => CommandOutcome::Reset { failed: Vec::new() },
        });

        let mode = parse(&backend.handle_json(r#"{"inst":"DEV_MODE","mode":2}"#));
        assert_eq!(mode["status"], "OK");
        assert_eq!(mode["result"]["mode"], 2);

        let ctrl = parse(&backend.handle_json(r#"{"inst":"DEV_CTRL","ctrl":1}"#));
        assert_eq!(ctrl["status"], "OK");
        assert_eq!(ctrl["result"]["ctrl"], 1);
        assert!(ctrl["result"].get("id").is_none());

        drop(backend);
        assert_eq!(worker.join().expect("worker").len(), 2);
    }

    #[test]
    fn bad_requests_never_reach_the_queue() {
        let (backend, receiver) = interface();

        let garbage = parse(&backend.handle_json("{not json"));
        assert_eq!(garbage["status"], "ERROR");

        let unknown = parse(&backend.handle_json(r#"{"inst":"DEV_SELF_DESTRUCT"}"#));
        assert_eq!(unknown["status"], "ERROR");
        assert_eq!(unknown["result"]["inst"], "DEV_SELF_DESTRUCT");

        let bad_mode = parse(&backend.handle_json(r#"{"inst":"DEV_MODE","mode":9}"#));
        assert_eq!(bad_mode["status"], "ERROR");

        let bad_id = parse(&backend.handle_json(
            r#"{"inst":"DEV_RESET","params":[{"id":"zz","lock":1,"clip":"00FF"}]}"#,
        ));
        assert_eq!(bad_id["status"], "ERROR");

        assert!(receiver.pop(Duration::from_millis(10)).expect("pop").is_none());
    }

    #[test]
    fn query_star_targets_everything() {
        let request: Request =
            serde_json::from_str(r#"{"inst":"DEV_QUERY","params":["*"]}"#).expect("request");
        assert_eq!(
            request.into_command().expect("command"),
            DeviceCommand::Query {
                target: QueryTarget::All
            }
        );

        let request: Request =
            serde_json::from_str(r#"{"inst":"DEV_QUERY","id":["01-00-00-00"]}"#).expect("request");
        assert_eq!(
            request.into_command().expect("command"),
            DeviceCommand::Query {
                target: QueryTarget::Devices(vec![DeviceId(1)])
            }
        );
    }

    #[test]
    fn timeout_becomes_error_response() {
        let (forwarder, _receiver) = forward_queue(1);
        let backend = BackendInterface::new(
            forwarder,
            OrchestratorConfig {
                forward_timeout: Duration::from_millis(10),
                ..OrchestratorConfig::default()
            },
        );
        let response = parse(&backend.handle_json(r#"{"inst":"DEV_CTRL","ctrl":0}"#));
        assert_eq!(response["status"], "ERROR");
        assert!(response["result"]["error"]
            .as_str()
            .expect("error text")
            .contains("timed out"));
    }

    #[test]
    fn binary_request_gets_binary_reply_on_uplink() {
        let (backend, receiver) = interface();
        let (uplink, mut host) = MemoryTransport::pair();
        let backend = backend.with_uplink(Arc::new(StagedTransmitter::new(
            Box::new(uplink) as Box<dyn Transport>
        )));
        let worker = fake_orchestrator(receiver, |command| match command {
            DeviceCommand::Configure { devices } => CommandOutcome::Configure {
                failed: vec![devices[1].id],
            },
            DeviceCommand::Mode { mode } => CommandOutcome::Mode {
                accepted: true,
                mode: *mode,
            },
            _ => CommandOutcome::Reset { failed: Vec::new() },
        });

        let entry = |id| SlaveCfgEntry {
            id: DeviceId(id),
            conduction_num: 4,
            resistance_num: 0,
            clip_mode: 0,
            clip_status: 0,
        };
        let request: Message = BackendToMaster::SlaveCfg(SlaveCfg {
            entries: vec![entry(1), entry(2)],
        })
        .into();
        let mut frame = BytesMut::new();
        PacketCodec::pack_frame(&request, Address::None, &mut frame).expect("pack");
        backend.serve_frame(&frame).expect("serve");

        let mut frame = BytesMut::new();
        PacketCodec::pack_frame(
            &BackendToMaster::ModeCfg(ModeCfg { mode: 1 }).into(),
            Address::None,
            &mut frame,
        )
        .expect("pack");
        backend.serve_frame(&frame).expect("serve");

        let replies: Vec<_> = host
            .drain()
            .expect("drain")
            .iter()
            .map(|bytes| FrameParser::new().parse(bytes).expect("reply").message)
            .collect();
        assert_eq!(
            replies,
            vec![
                Message::MasterToBackend(MasterToBackend::SlaveCfg(SlaveCfgRsp {
                    status: STATUS_FAILURE,
                    entries: vec![entry(2)],
                })),
                Message::MasterToBackend(MasterToBackend::ModeCfg(ModeCfgRsp {
                    status: STATUS_SUCCESS,
                    mode: 1,
                })),
            ]
        );

        drop(backend);
        worker.join().expect("worker");
    }

    #[test]
    fn non_backend_frames_are_ignored() {
        let (backend, _receiver) = interface();
        let mut frame = BytesMut::new();
        PacketCodec::pack_frame(
            &chronolink_protocol::message::MasterToSlave::Sync(
                chronolink_protocol::message::master_slave::Sync {
                    mode: 0,
                    timestamp: 0,
                },
            )
            .into(),
            Address::device(DeviceId::BROADCAST),
            &mut frame,
        )
        .expect("pack");
        assert!(backend.handle_frame(&frame).expect("handled").is_none());
        assert!(backend.handle_frame(&[0xAB]).is_err());
    }
}
