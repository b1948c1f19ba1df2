use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

/// A 32-bit device identity.
///
/// On the wire the id is four little-endian bytes. Its text form lists those
/// wire bytes in order as uppercase hex pairs, e.g. `37-32-48-5B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Address that every Slave accepts.
    pub const BROADCAST: DeviceId = DeviceId(0xFFFF_FFFF);

    pub fn from_wire(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    pub fn to_wire(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.to_wire();
        write!(f, "{a:02X}-{b:02X}-{c:02X}-{d:02X}")
    }
}

impl FromStr for DeviceId {
    type Err = ProtocolError;

    /// Accepts `AA-BB-CC-DD`, `AA:BB:CC:DD` or eight bare hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidDeviceId(s.to_string());
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | ':'))
            .collect();
        if digits.len() != 8 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = digits.get(i * 2..i * 2 + 2).ok_or_else(invalid)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self::from_wire(bytes))
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_lists_wire_bytes() {
        let id = DeviceId::from_wire([0x37, 0x32, 0x48, 0x5B]);
        assert_eq!(id.0, 0x5B48_3237);
        assert_eq!(id.to_string(), "37-32-48-5B");
    }

    #[test]
    fn parses_separated_and_bare_forms() {
        let dashed: DeviceId = "37-32-48-5B".parse().expect("dashed");
        let colon: DeviceId = "37:32:48:5b".parse().expect("colon");
        let bare: DeviceId = "3732485B".parse().expect("bare");
        assert_eq!(dashed, colon);
        assert_eq!(dashed, bare);
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["", "37-32-48", "37-32-48-5B-00", "ZZ-32-48-5B", "3é-32-48-5"] {
            assert!(bad.parse::<DeviceId>().is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn serde_uses_text_form() {
        let id = DeviceId(0x0403_0201);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"01-02-03-04\"");
        let back: DeviceId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn broadcast_is_all_ones() {
        assert!(DeviceId::BROADCAST.is_broadcast());
        assert_eq!(DeviceId::BROADCAST.to_string(), "FF-FF-FF-FF");
    }
}
