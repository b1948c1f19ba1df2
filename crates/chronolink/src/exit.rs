use std::fmt;
use std::io;

use chronolink_frame::FrameError;
use chronolink_node::NodeError;
use chronolink_protocol::ProtocolError;
use chronolink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::WriteAccessDenied(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::TooManyFragments { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn protocol_error(context: &str, err: ProtocolError) -> CliError {
    match err {
        ProtocolError::InvalidDeviceId(_) | ProtocolError::InvalidAddress { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn node_error(context: &str, err: NodeError) -> CliError {
    match err {
        NodeError::Transport(err) => transport_error(context, err),
        NodeError::Frame(err) => frame_error(context, err),
        NodeError::Protocol(err) => protocol_error(context, err),
        NodeError::Timeout(_) | NodeError::RetriesExhausted { .. } => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        NodeError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        NodeError::Disconnected(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        NodeError::Spawn { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
