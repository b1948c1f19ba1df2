//! Commands forwarded from the Backend surface to the orchestrator.

use std::fmt;

use chronolink_protocol::message::backend::DeviceListEntry;
use chronolink_protocol::DeviceId;
use serde::Serialize;

/// Test mode carried in `Sync` and chosen by `DEV_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TestMode {
    #[default]
    Conduction = 0,
    Resistance = 1,
    Clip = 2,
}

impl TestMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Conduction),
            1 => Some(Self::Resistance),
            2 => Some(Self::Clip),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Conduction => "conduction",
            Self::Resistance => "resistance",
            Self::Clip => "clip",
        })
    }
}

/// Requested state of the periodic test cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunState {
    Disabled = 0,
    Enabled = 1,
}

impl RunState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::Enabled),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Clip testing requested for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClipSetup {
    pub mode: u8,
    pub pin: u16,
}

/// One device in a configure batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSetup {
    pub id: DeviceId,
    pub conduction_num: u16,
    pub resistance_num: u16,
    pub clip: Option<ClipSetup>,
}

impl DeviceSetup {
    pub fn new(id: DeviceId, conduction_num: u16) -> Self {
        Self {
            id,
            conduction_num,
            resistance_num: 0,
            clip: None,
        }
    }
}

/// One device in a reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceReset {
    pub id: DeviceId,
    pub lock: u8,
    pub clip_led: u16,
}

/// Which devices a query pings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTarget {
    /// Every registered device.
    All,
    Devices(Vec<DeviceId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    Configure { devices: Vec<DeviceSetup> },
    Mode { mode: TestMode },
    Control { state: RunState },
    Reset { devices: Vec<DeviceReset> },
    Query { target: QueryTarget },
}

impl DeviceCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "configure",
            Self::Mode { .. } => "mode",
            Self::Control { .. } => "control",
            Self::Reset { .. } => "reset",
            Self::Query { .. } => "query",
        }
    }
}

/// What the orchestrator reports back for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandOutcome {
    Configure {
        failed: Vec<DeviceId>,
    },
    Mode {
        accepted: bool,
        mode: TestMode,
    },
    Control {
        accepted: bool,
        state: RunState,
    },
    Reset {
        failed: Vec<DeviceId>,
    },
    Query {
        unreachable: Vec<DeviceId>,
        devices: Vec<DeviceListEntry>,
    },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Configure { failed } | Self::Reset { failed } => failed.is_empty(),
            Self::Mode { accepted, .. } | Self::Control { accepted, .. } => *accepted,
            Self::Query { unreachable, .. } => unreachable.is_empty(),
        }
    }

    /// Devices that did not complete the command.
    pub fn failed_ids(&self) -> &[DeviceId] {
        match self {
            Self::Configure { failed } | Self::Reset { failed } => failed,
            Self::Query { unreachable, .. } => unreachable,
            Self::Mode { .. } | Self::Control { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_and_state_bytes() {
        assert_eq!(TestMode::from_u8(1), Some(TestMode::Resistance));
        assert_eq!(TestMode::from_u8(3), None);
        assert_eq!(TestMode::Clip.as_u8(), 2);
        assert_eq!(RunState::from_u8(1), Some(RunState::Enabled));
        assert_eq!(RunState::from_u8(2), None);
    }

    #[test]
    fn outcome_success_follows_failures() {
        let ok = CommandOutcome::Configure { failed: Vec::new() };
        assert!(ok.is_success());

        let partial = CommandOutcome::Reset {
            failed: vec![DeviceId(3)],
        };
        assert!(!partial.is_success());
        assert_eq!(partial.failed_ids(), &[DeviceId(3)]);

        let rejected = CommandOutcome::Control {
            accepted: false,
            state: RunState::Enabled,
        };
        assert!(!rejected.is_success());
        assert!(rejected.failed_ids().is_empty());
    }
}
