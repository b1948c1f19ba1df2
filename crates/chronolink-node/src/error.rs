use std::time::Duration;

use chronolink_protocol::{DeviceId, MessageKind};

/// Errors raised by the master and slave roles.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] chronolink_transport::TransportError),

    /// Link framing error.
    #[error("frame error: {0}")]
    Frame(#[from] chronolink_frame::FrameError),

    /// Packet or message encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] chronolink_protocol::ProtocolError),

    /// A bounded wait elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// No matching reply after every attempt.
    #[error("no {expected} reply after {attempts} attempts")]
    RetriesExhausted { expected: MessageKind, attempts: u32 },

    /// The forward queue stayed full for the whole push timeout.
    #[error("forward queue full (capacity {capacity}) for {waited:?}")]
    QueueBackpressure { capacity: usize, waited: Duration },

    /// A device answered with a non-zero status.
    #[error("{device} rejected {command} (status {status:?})")]
    Rejected {
        device: DeviceId,
        command: &'static str,
        status: Option<u8>,
    },

    /// Another command is already outstanding on the channel.
    #[error("a command is already in flight")]
    ChannelBusy,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The other side of a queue or link went away.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// A worker thread could not be started.
    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, NodeError>;
