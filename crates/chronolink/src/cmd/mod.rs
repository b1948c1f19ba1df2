use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod master;
pub mod slave;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve simulated slaves on a Unix socket medium.
    Slave(SlaveArgs),
    /// Drive slaves with Backend JSON requests.
    Master(MasterArgs),
    /// Decode one protocol frame given as hex.
    Decode(DecodeArgs),
    /// Build a protocol frame and print it.
    #[command(subcommand)]
    Encode(EncodeCommand),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Slave(args) => slave::run(args),
        Command::Master(args) => master::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(command) => encode::run(command, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SlaveArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Device id of a simulated slave (repeatable), e.g. 37-32-48-5B.
    #[arg(long = "id", value_name = "ID", required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct MasterArgs {
    /// Slave medium socket path to connect to.
    pub path: PathBuf,
    /// One Backend JSON request.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub request: Option<String>,
    /// File with one Backend JSON request per line.
    #[arg(long, conflicts_with = "request")]
    pub file: Option<PathBuf>,
    /// Socket path receiving uploaded test results.
    #[arg(long, value_name = "PATH")]
    pub uplink: Option<PathBuf>,
    /// Reply wait per attempt (e.g. 500ms, 1s).
    #[arg(long, default_value = "500ms")]
    pub response_timeout: String,
    /// Retransmissions after the first attempt.
    #[arg(long, default_value = "3")]
    pub retries: u32,
    /// Keep the test cycle running this long after the last request.
    #[arg(long, value_name = "DURATION")]
    pub linger: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex; spaces, colons and dashes are ignored.
    pub hex: String,
    /// Filter Master->Slave frames as this device would.
    #[arg(long, value_name = "ID")]
    pub local_id: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum EncodeCommand {
    /// Broadcast Sync.
    Sync(EncodeSyncArgs),
    /// Ping request to one device.
    Ping(EncodePingArgs),
}

#[derive(Args, Debug)]
pub struct EncodeSyncArgs {
    /// Test mode (0 conduction, 1 resistance, 2 clip).
    #[arg(long, default_value = "0")]
    pub mode: u8,
    /// Cycle timestamp in milliseconds.
    #[arg(long, default_value = "0")]
    pub timestamp: u32,
}

#[derive(Args, Debug)]
pub struct EncodePingArgs {
    /// Destination device id.
    #[arg(long, value_name = "ID")]
    pub to: String,
    #[arg(long, default_value = "0")]
    pub sequence: u16,
    #[arg(long, default_value = "0")]
    pub timestamp: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
