use std::time::Duration;

/// Settings for a [`ReliableCommandChannel`](crate::ReliableCommandChannel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long to wait for a reply after each transmit.
    pub response_timeout: Duration,
    /// Additional attempts after the first one.
    pub retry_times: u32,
    /// Link slot byte stamped on outgoing frames.
    pub slot: u8,
}

impl ChannelConfig {
    /// Total transmits for a command that never gets its reply.
    pub fn attempts(&self) -> u32 {
        self.retry_times.saturating_add(1)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(500),
            retry_times: 3,
            slot: 0,
        }
    }
}

/// Settings for the orchestrator and the Backend-facing interface.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Forward queue capacity.
    pub queue_capacity: usize,
    /// Bound on pushing a command into a full queue.
    pub forward_queue_timeout: Duration,
    /// Bound on waiting for a forwarded command's outcome.
    pub forward_timeout: Duration,
    /// Conduction test time per harness pin.
    pub conduction_interval: Duration,
    /// Clip sampling interval sent in `ClipCfg`.
    pub clip_interval: u8,
    /// Slack added to the conduction cycle period.
    pub sync_redundancy: Duration,
    /// Cycle period outside conduction mode.
    pub idle_cycle_period: Duration,
    /// Bound on acquiring the uplink staging buffer.
    pub upload_access_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            forward_queue_timeout: Duration::from_secs(5),
            forward_timeout: Duration::from_secs(5),
            conduction_interval: Duration::from_millis(10),
            clip_interval: 10,
            sync_redundancy: Duration::from_millis(100),
            idle_cycle_period: Duration::from_secs(1),
            upload_access_timeout: Duration::from_secs(1),
        }
    }
}
