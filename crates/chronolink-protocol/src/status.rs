use serde::{Deserialize, Serialize};

/// Slave peripheral status bitfield, carried as a little-endian u16.
///
/// Bits 9..15 are reserved; they are kept as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceStatus(pub u16);

impl DeviceStatus {
    pub const COLOR_SENSOR: u16 = 1 << 0;
    pub const SLEEVE_LIMIT: u16 = 1 << 1;
    pub const UNLOCK_BUTTON: u16 = 1 << 2;
    pub const BATTERY_LOW: u16 = 1 << 3;
    pub const PRESSURE_SENSOR: u16 = 1 << 4;
    pub const LOCK_1: u16 = 1 << 5;
    pub const LOCK_2: u16 = 1 << 6;
    pub const ACCESSORY_1: u16 = 1 << 7;
    pub const ACCESSORY_2: u16 = 1 << 8;

    const NAMED: [(u16, &'static str); 9] = [
        (Self::COLOR_SENSOR, "color_sensor"),
        (Self::SLEEVE_LIMIT, "sleeve_limit"),
        (Self::UNLOCK_BUTTON, "unlock_button"),
        (Self::BATTERY_LOW, "battery_low"),
        (Self::PRESSURE_SENSOR, "pressure_sensor"),
        (Self::LOCK_1, "lock_1"),
        (Self::LOCK_2, "lock_2"),
        (Self::ACCESSORY_1, "accessory_1"),
        (Self::ACCESSORY_2, "accessory_2"),
    ];

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    /// Copy with `flag` set or cleared.
    pub fn with(self, flag: u16, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }

    /// Names of the set, non-reserved bits, lowest bit first.
    pub fn active(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}
