//! Link framing for the ChronoLink harness-test network.
//!
//! Every link frame carries an 8-byte header:
//! - A 2-byte delimiter (`0xAB 0xCD`) for stream resynchronization
//! - A 2-byte little-endian length of this fragment's payload chunk
//! - Slot and link-type bytes
//! - Fragment index and a "more fragments" flag
//!
//! Payloads larger than one chunk (242 bytes by default) are split into
//! numbered fragments and reassembled by [`LinkFramer`] on the receiving side.

pub mod assembler;
pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use assembler::{CompleteFrame, LinkFramer, ReassemblyPolicy};
pub use codec::{
    decode_fragment, encode_fragment, encode_frames, fragment, FrameConfig, LinkFrame, DELIMITER,
    HEADER_SIZE, MAX_CHUNK, MAX_FRAGMENTS,
};
pub use error::{FrameError, Result};
pub use kind::{kind_name, COMMAND, REPLY, SYNC, UNKNOWN};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use tokio_codec::LinkCodec;
