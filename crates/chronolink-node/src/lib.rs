//! Master and slave roles of the ChronoLink harness-test network.
//!
//! The master side is built from three pieces:
//! - [`ReliableCommandChannel`] sends one command at a time and waits,
//!   bounded and with retries, for the matching reply
//! - [`DeviceOrchestrator`] consumes forwarded Backend commands in FIFO
//!   order and drives the slaves through the channel
//! - [`BackendInterface`] turns JSON or binary Backend requests into
//!   forwarded commands and formats the outcome
//!
//! [`SlaveNode`] is the device side, used for simulation and testing.

pub mod backend;
pub mod batch;
pub mod command;
pub mod config;
pub mod error;
pub mod forward;
pub mod orchestrator;
pub mod reliable;
pub mod slave;

pub use backend::{BackendInterface, BackendResponse, ResponseStatus, Uplink};
pub use batch::{plan_slots, SlotAssignment};
pub use command::{
    ClipSetup, CommandOutcome, DeviceCommand, DeviceReset, DeviceSetup, QueryTarget, RunState,
    TestMode,
};
pub use config::{ChannelConfig, OrchestratorConfig};
pub use error::{NodeError, Result};
pub use forward::{forward_queue, ForwardReceiver, Forwarded, Forwarder};
pub use orchestrator::{DeviceOrchestrator, RegisteredDevice};
pub use reliable::{ChannelState, Expectation, ReliableCommandChannel};
pub use slave::{SlaveBus, SlaveNode};
