//! Link-layer (MAC) address value

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::address::AddressError;

/// 48-bit hardware address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// All-zero address, used by the OS for incomplete neighbor entries
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 6]
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = AddressError;

    /// Accepts `:` or `-` separators and one or two hex digits per octet
    /// (macOS `arp` prints `0:1b:...`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidFormat(s.to_string());
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        Ok(Self(octets))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_and_dash() {
        let expected = MacAddress([0x00, 0x1B, 0x44, 0x11, 0x3A, 0xB7]);
        assert_eq!("00:1b:44:11:3a:b7".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("00-1B-44-11-3A-B7".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("0:1b:44:11:3a:b7".parse::<MacAddress>().unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("00:1b:44:11:3a".parse::<MacAddress>().is_err());
        assert!("00:1b:44:11:3a:zz".parse::<MacAddress>().is_err());
        assert!("001:1b:44:11:3a:b7".parse::<MacAddress>().is_err());
        assert!("(incomplete)".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_display_uppercase() {
        let mac = MacAddress([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03]);
        assert_eq!(mac.to_string(), "AA:BB:CC:01:02:03");
    }

    #[test]
    fn test_is_empty() {
        assert!(MacAddress::default().is_empty());
        assert!(!MacAddress([0, 0, 0, 0, 0, 1]).is_empty());
    }
}
