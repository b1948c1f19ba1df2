//! Byte transports for the ChronoLink protocol stack.
//!
//! Everything above this crate sees a link as a [`Transport`]: push bytes
//! out, wait (bounded) for bytes to come in. Implementations:
//! - [`MemoryTransport`] linked pairs for tests and in-process wiring
//! - [`UnixLink`] over Unix domain sockets (simulated UART medium)
//!
//! [`TxStaging`] guards a shared transmit buffer with a scoped write-access
//! lock so a partially written buffer is never handed to the link.

pub mod error;
pub mod memory;
pub mod staging;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use staging::{StagedTransmitter, StagingGuard, TxStaging};
pub use traits::Transport;

#[cfg(unix)]
pub use uds::{UnixDomainSocket, UnixLink};
