//! Drives the slaves on behalf of forwarded Backend commands.
//!
//! One command is processed to completion before the next is popped.
//! Between commands, a running test cycle reads results from every
//! registered device and re-broadcasts `Sync` once per period.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use chronolink_protocol::message::backend::DeviceListEntry;
use chronolink_protocol::message::master_slave::{
    ClipCfg, CondCfg, PingReq, ReadData, ResCfg, Rst, Sync as SyncMsg,
};
use chronolink_protocol::message::{MasterToSlave, SlaveToBackend, SlaveToMaster};
use chronolink_protocol::{
    Address, DeviceId, Direction, Envelope, Message, MessageKind, PacketCodec,
};
use chronolink_transport::{Transport, TransportError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::Uplink;
use crate::batch::plan_slots;
use crate::command::{
    CommandOutcome, DeviceCommand, DeviceReset, DeviceSetup, QueryTarget, RunState, TestMode,
};
use crate::config::OrchestratorConfig;
use crate::error::{NodeError, Result};
use crate::forward::ForwardReceiver;
use crate::reliable::{Expectation, ReliableCommandChannel};

/// Idle wait for the next command when no cycle is armed.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// A device that completed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisteredDevice {
    pub id: DeviceId,
    pub time_slot: u8,
    pub conduction_num: u16,
    pub resistance_num: u16,
}

/// Master-side coordinator for configure, mode, control, reset and query.
pub struct DeviceOrchestrator<T> {
    channel: ReliableCommandChannel<T>,
    config: OrchestratorConfig,
    uplink: Option<Uplink>,
    mode: TestMode,
    state: RunState,
    registry: Vec<RegisteredDevice>,
    total_harness: u16,
    sync_outstanding: bool,
    next_cycle: Option<Instant>,
    ping_sequence: u16,
    epoch: Instant,
}

impl<T: Transport> DeviceOrchestrator<T> {
    pub fn new(channel: ReliableCommandChannel<T>, config: OrchestratorConfig) -> Self {
        Self {
            channel,
            config,
            uplink: None,
            mode: TestMode::default(),
            state: RunState::Disabled,
            registry: Vec::new(),
            total_harness: 0,
            sync_outstanding: false,
            next_cycle: None,
            ping_sequence: 0,
            epoch: Instant::now(),
        }
    }

    /// Forward cycle results to the Backend through `uplink`.
    pub fn with_uplink(mut self, uplink: Uplink) -> Self {
        self.uplink = Some(uplink);
        self
    }

    pub fn mode(&self) -> TestMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Enabled
    }

    pub fn registry(&self) -> &[RegisteredDevice] {
        &self.registry
    }

    /// Harness pins across the configured batch.
    pub fn total_harness(&self) -> u16 {
        self.total_harness
    }

    pub fn channel(&self) -> &ReliableCommandChannel<T> {
        &self.channel
    }

    /// Test cycle period for the current mode and batch.
    pub fn cycle_period(&self) -> Duration {
        match self.mode {
            TestMode::Conduction => {
                self.config.conduction_interval * u32::from(self.total_harness)
                    + self.config.sync_redundancy
            }
            TestMode::Resistance | TestMode::Clip => self.config.idle_cycle_period,
        }
    }

    /// Process one command to completion.
    pub fn handle(&mut self, command: &DeviceCommand) -> CommandOutcome {
        debug!(command = command.name(), "processing");
        let outcome = match command {
            DeviceCommand::Configure { devices } => self.configure(devices),
            DeviceCommand::Mode { mode } => self.set_mode(*mode),
            DeviceCommand::Control { state } => self.control(*state),
            DeviceCommand::Reset { devices } => self.reset(devices),
            DeviceCommand::Query { target } => self.query(target),
        };
        if outcome.is_success() {
            info!(command = command.name(), "command complete");
        } else {
            warn!(
                command = command.name(),
                failed = outcome.failed_ids().len(),
                "command incomplete"
            );
        }
        outcome
    }

    /// Configure a batch in submission order.
    ///
    /// Every device is attempted even when an earlier one fails. Devices
    /// that succeed replace the registry.
    pub fn configure(&mut self, devices: &[DeviceSetup]) -> CommandOutcome {
        let all_failed = || CommandOutcome::Configure {
            failed: devices.iter().map(|device| device.id).collect(),
        };
        if self.is_running() {
            error!("test cycle running; configuration discarded");
            return all_failed();
        }

        let conduction: Vec<u16> = devices.iter().map(|d| d.conduction_num).collect();
        let resistance: Vec<u16> = devices.iter().map(|d| d.resistance_num).collect();
        let (Some(cond_plan), Some(res_plan)) = (plan_slots(&conduction), plan_slots(&resistance))
        else {
            error!(devices = devices.len(), "batch too large for time slots");
            return all_failed();
        };

        let interval = millis_u8(self.config.conduction_interval);
        let mut failed = Vec::new();
        let mut registry = Vec::with_capacity(devices.len());
        for ((device, cond), res) in devices.iter().zip(&cond_plan).zip(&res_plan) {
            let cond_cfg = CondCfg {
                time_slot: cond.time_slot,
                interval,
                total_conduction_num: cond.total,
                start_conduction_num: cond.start,
                conduction_num: cond.count,
            };
            let res_cfg = (device.resistance_num > 0).then_some(ResCfg {
                time_slot: res.time_slot,
                interval,
                total_resistance_num: res.total,
                start_resistance_num: res.start,
                resistance_num: res.count,
            });
            let clip_cfg = device.clip.map(|clip| ClipCfg {
                interval: self.config.clip_interval,
                mode: clip.mode,
                clip_pin: clip.pin,
            });

            match self.configure_device(device.id, cond_cfg, res_cfg, clip_cfg) {
                Ok(()) => {
                    debug!(
                        device = %device.id,
                        slot = cond.time_slot,
                        start = cond.start,
                        last = cond.is_last,
                        "device configured"
                    );
                    registry.push(RegisteredDevice {
                        id: device.id,
                        time_slot: cond.time_slot,
                        conduction_num: device.conduction_num,
                        resistance_num: device.resistance_num,
                    });
                }
                Err(err) => {
                    warn!(device = %device.id, error = %err, "device configuration failed");
                    failed.push(device.id);
                }
            }
        }

        self.total_harness = cond_plan.first().map_or(0, |slot| slot.total);
        self.registry = registry;
        info!(
            devices = devices.len(),
            failed = failed.len(),
            total_harness = self.total_harness,
            "configuration batch done"
        );
        CommandOutcome::Configure { failed }
    }

    fn configure_device(
        &self,
        id: DeviceId,
        cond: CondCfg,
        res: Option<ResCfg>,
        clip: Option<ClipCfg>,
    ) -> Result<()> {
        self.acknowledged(id, MasterToSlave::CondCfg(cond), SlaveToMaster::COND_INFO)?;
        if let Some(res) = res {
            self.acknowledged(id, MasterToSlave::ResCfg(res), SlaveToMaster::RES_INFO)?;
        }
        if let Some(clip) = clip {
            self.acknowledged(id, MasterToSlave::ClipCfg(clip), SlaveToMaster::CLIP_INFO)?;
        }
        Ok(())
    }

    /// Send `command` to `id` and require a zero-status `reply_id` answer.
    fn acknowledged(&self, id: DeviceId, command: MasterToSlave, reply_id: u8) -> Result<()> {
        let name = command.name();
        let envelope = self.channel.request(
            &command.into(),
            Address::device(id),
            Expectation::from_device(MessageKind::new(Direction::SlaveToMaster, reply_id), id),
        )?;
        let status = match &envelope.message {
            Message::SlaveToMaster(reply) => reply.status(),
            _ => None,
        };
        if status == Some(0) {
            return Ok(());
        }
        warn!(device = %id, command = name, ?status, "device rejected command");
        Err(NodeError::Rejected {
            device: id,
            command: name,
            status,
        })
    }

    pub fn set_mode(&mut self, mode: TestMode) -> CommandOutcome {
        if self.is_running() {
            error!(%mode, "test cycle running; mode change discarded");
            return CommandOutcome::Mode {
                accepted: false,
                mode,
            };
        }
        info!(%mode, "test mode set");
        self.mode = mode;
        CommandOutcome::Mode {
            accepted: true,
            mode,
        }
    }

    /// Start or stop the test cycle, announcing it with one `Sync`.
    pub fn control(&mut self, state: RunState) -> CommandOutcome {
        let rejected = CommandOutcome::Control {
            accepted: false,
            state,
        };
        match state {
            RunState::Enabled => {
                if self.registry.is_empty() {
                    error!("no devices configured; control discarded");
                    return rejected;
                }
                if let Err(err) = self.broadcast_sync() {
                    warn!(error = %err, "sync broadcast failed");
                    return rejected;
                }
                self.state = RunState::Enabled;
                self.sync_outstanding = true;
                let period = self.cycle_period();
                self.next_cycle = Some(Instant::now() + period);
                info!(
                    total_harness = self.total_harness,
                    period = ?period,
                    "test cycle started"
                );
            }
            RunState::Disabled => {
                self.state = RunState::Disabled;
                self.sync_outstanding = false;
                self.next_cycle = None;
                if let Err(err) = self.broadcast_sync() {
                    warn!(error = %err, "sync broadcast failed");
                }
                info!("test cycle stopped");
            }
        }
        CommandOutcome::Control {
            accepted: true,
            state,
        }
    }

    pub fn reset(&mut self, devices: &[DeviceReset]) -> CommandOutcome {
        let mut failed = Vec::new();
        for device in devices {
            let command = MasterToSlave::Rst(Rst {
                lock: device.lock,
                clip_led: device.clip_led,
            });
            if let Err(err) = self.acknowledged(device.id, command, SlaveToMaster::RST) {
                warn!(device = %device.id, error = %err, "reset failed");
                failed.push(device.id);
            }
        }
        CommandOutcome::Reset { failed }
    }

    /// Ping each target and report who answered.
    pub fn query(&mut self, target: &QueryTarget) -> CommandOutcome {
        let targets: Vec<DeviceId> = match target {
            QueryTarget::All => self.registry.iter().map(|device| device.id).collect(),
            QueryTarget::Devices(ids) => ids.clone(),
        };

        let mut unreachable = Vec::new();
        let mut devices = Vec::with_capacity(targets.len());
        for (index, id) in targets.into_iter().enumerate() {
            self.ping_sequence = self.ping_sequence.wrapping_add(1);
            let ping = MasterToSlave::PingReq(PingReq {
                sequence: self.ping_sequence,
                timestamp: self.timestamp(),
            });
            let online = match self.channel.request(
                &ping.into(),
                Address::device(id),
                Expectation::from_device(
                    MessageKind::new(Direction::SlaveToMaster, SlaveToMaster::PING_RSP),
                    id,
                ),
            ) {
                Ok(_) => true,
                Err(err) => {
                    debug!(device = %id, error = %err, "device unreachable");
                    unreachable.push(id);
                    false
                }
            };
            let short_id = self
                .registry
                .iter()
                .find(|device| device.id == id)
                .map_or(u8::try_from(index).unwrap_or(u8::MAX), |device| device.time_slot);
            devices.push(DeviceListEntry {
                id,
                short_id,
                online,
                version_major: 0,
                version_minor: 0,
                version_patch: 0,
            });
        }
        CommandOutcome::Query {
            unreachable,
            devices,
        }
    }

    /// Run one cycle step if the period has elapsed at `now`.
    ///
    /// Data is only collected when the previous `Sync` is still outstanding.
    /// Returns the number of results uploaded.
    pub fn poll_cycle(&mut self, now: Instant) -> Result<usize> {
        let Some(due) = self.next_cycle else {
            return Ok(0);
        };
        if !self.is_running() || now < due {
            return Ok(0);
        }

        let mut uploaded = 0;
        if self.sync_outstanding {
            uploaded = self.collect_results();
            self.sync_outstanding = false;
        }
        self.broadcast_sync()?;
        self.sync_outstanding = true;
        self.next_cycle = Some(now + self.cycle_period());
        Ok(uploaded)
    }

    fn collect_results(&mut self) -> usize {
        let (read, reply_id) = match self.mode {
            TestMode::Conduction => (
                MasterToSlave::ReadCondData(ReadData::default()),
                SlaveToBackend::COND_DATA,
            ),
            TestMode::Resistance => (
                MasterToSlave::ReadResData(ReadData::default()),
                SlaveToBackend::RES_DATA,
            ),
            TestMode::Clip => (
                MasterToSlave::ReadClipData(ReadData::default()),
                SlaveToBackend::CLIP_DATA,
            ),
        };
        let read: Message = read.into();
        let kind = MessageKind::new(Direction::SlaveToBackend, reply_id);

        let mut uploaded = 0;
        for device in &self.registry {
            let envelope = match self.channel.request(
                &read,
                Address::device(device.id),
                Expectation::from_device(kind, device.id),
            ) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(device = %device.id, error = %err, "result read failed");
                    continue;
                }
            };
            match self.upload(&envelope) {
                Ok(true) => uploaded += 1,
                Ok(false) => {}
                Err(err) => warn!(device = %device.id, error = %err, "result upload failed"),
            }
        }
        debug!(mode = %self.mode, uploaded, "cycle results collected");
        uploaded
    }

    /// Relay a Slave->Backend report to the uplink, if one is attached.
    fn upload(&self, envelope: &Envelope) -> Result<bool> {
        let Some(uplink) = &self.uplink else {
            return Ok(false);
        };
        let mut frame = BytesMut::new();
        PacketCodec::pack_frame(&envelope.message, envelope.address, &mut frame)?;
        uplink.send(&frame, self.config.upload_access_timeout)?;
        Ok(true)
    }

    fn broadcast_sync(&self) -> Result<()> {
        let sync = MasterToSlave::Sync(SyncMsg {
            mode: self.mode.as_u8(),
            timestamp: self.timestamp(),
        });
        self.channel
            .broadcast(&sync.into(), Address::device(DeviceId::BROADCAST))
    }

    /// Milliseconds since start, wrapping.
    fn timestamp(&self) -> u32 {
        (self.epoch.elapsed().as_millis() & u128::from(u32::MAX)) as u32
    }

    fn next_wait(&self) -> Duration {
        match self.next_cycle {
            Some(due) if self.is_running() => due.saturating_duration_since(Instant::now()),
            _ => IDLE_POLL,
        }
    }

    /// Serve forwarded commands until every producer is gone.
    pub fn run(mut self, receiver: ForwardReceiver) -> Result<()> {
        info!("orchestrator started");
        loop {
            match receiver.pop(self.next_wait()) {
                Ok(Some(item)) => {
                    let outcome = self.handle(&item.command);
                    item.complete(outcome);
                }
                Ok(None) => {}
                Err(NodeError::Disconnected(_)) => {
                    info!("forward queue closed; orchestrator stopping");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }

            match self.poll_cycle(Instant::now()) {
                Ok(_) => {}
                Err(NodeError::Transport(TransportError::Disconnected)) => {
                    error!("slave link disconnected; orchestrator stopping");
                    return Err(NodeError::Transport(TransportError::Disconnected));
                }
                Err(err) => warn!(error = %err, "test cycle step failed"),
            }
        }
    }
}

impl<T: Transport + 'static> DeviceOrchestrator<T> {
    /// Run on a dedicated thread.
    pub fn spawn(self, receiver: ForwardReceiver) -> Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("chronolink-orchestrator".to_string())
            .spawn(move || self.run(receiver))
            .map_err(|source| NodeError::Spawn {
                name: "orchestrator",
                source,
            })
    }
}

impl<T> std::fmt::Debug for DeviceOrchestrator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceOrchestrator")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("total_harness", &self.total_harness)
            .finish_non_exhaustive()
    }
}

fn millis_u8(duration: Duration) -> u8 {
    u8::try_from(duration.as_millis()).unwrap_or(u8::MAX)
}
