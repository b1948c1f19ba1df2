//! Master/slave protocol stack for distributed wiring-harness test devices.
//!
//! A Master drives many Slave test devices over a shared serial-style link
//! and relays their results to a Backend host.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte links (in-memory pairs, Unix sockets) and transmit staging
//! - [`frame`]: link framing with fragmentation, resync and reassembly
//! - [`protocol`]: protocol frames, packets, typed messages and the frame parser
//! - [`node`]: reliable commands, the device orchestrator, the Backend surface
//!   and a simulated Slave (behind the `node` feature)

/// Re-export transport types.
pub mod transport {
    pub use chronolink_transport::*;
}

/// Re-export link framing types.
pub mod frame {
    pub use chronolink_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use chronolink_protocol::*;
}

/// Re-export Master/Slave role types (requires `node` feature).
#[cfg(feature = "node")]
pub mod node {
    pub use chronolink_node::*;
}
