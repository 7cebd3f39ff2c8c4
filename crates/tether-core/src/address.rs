//! IPv4/IPv6 address values and the segment arithmetic used for subnet scanning
//!
//! Both families are stored as big-endian segment arrays (4 octets or 8
//! sixteen-bit groups). Masking, base-address and host-offset calculations
//! share one implementation that only differs in segment width and count.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid IP address format: {0:?}")]
    InvalidFormat(String),
    #[error("Prefix length {prefix} exceeds the {family} bit width")]
    InvalidPrefix { prefix: u32, family: AddressFamily },
    #[error("Address family mismatch: {0} and {1}")]
    FamilyMismatch(AddressFamily, AddressFamily),
}

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Total number of bits in an address of this family
    pub const fn bit_width(self) -> u32 {
        match self {
            Self::V4 => 32,
            Self::V6 => 128,
        }
    }

    const fn segment_bits(self) -> u32 {
        match self {
            Self::V4 => 8,
            Self::V6 => 16,
        }
    }

    const fn segment_count(self) -> usize {
        match self {
            Self::V4 => 4,
            Self::V6 => 8,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// Immutable IP address value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpAddress {
    V4([u8; 4]),
    V6([u16; 8]),
}

impl IpAddress {
    /// The all-zero address of the given family
    pub const fn unspecified(family: AddressFamily) -> Self {
        match family {
            AddressFamily::V4 => Self::V4([0; 4]),
            AddressFamily::V6 => Self::V6([0; 8]),
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Self::V4(_) => AddressFamily::V4,
            Self::V6(_) => AddressFamily::V6,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.to_bits() == 0
    }

    /// Unsigned integer value of the address, right-aligned to the family width
    pub fn to_bits(&self) -> u128 {
        let width = self.family().segment_bits();
        self.segments()
            .iter()
            .fold(0u128, |acc, &segment| (acc << width) | u128::from(segment))
    }

    /// Build an address from its integer value. Bits above the family width are dropped.
    pub fn from_bits(family: AddressFamily, bits: u128) -> Self {
        let width = family.segment_bits();
        let count = family.segment_count();
        let segment_mask = (1u128 << width) - 1;

        let segments: Vec<u32> = (0..count)
            .map(|i| {
                let shift = width * (count - 1 - i) as u32;
                ((bits >> shift) & segment_mask) as u32
            })
            .collect();

        Self::from_segments(family, &segments)
    }

    /// Network mask with the first `prefix_len` bits set
    pub fn mask(family: AddressFamily, prefix_len: u32) -> Result<Self, AddressError> {
        if prefix_len > family.bit_width() {
            return Err(AddressError::InvalidPrefix {
                prefix: prefix_len,
                family,
            });
        }

        let width = family.segment_bits();
        let full = (1u32 << width) - 1;
        let mut remaining = prefix_len;

        let segments: Vec<u32> = (0..family.segment_count())
            .map(|_| {
                if remaining >= width {
                    remaining -= width;
                    full
                } else if remaining > 0 {
                    let segment = (full << (width - remaining)) & full;
                    remaining = 0;
                    segment
                } else {
                    0
                }
            })
            .collect();

        Ok(Self::from_segments(family, &segments))
    }

    /// Bitwise AND of this address with `mask`
    pub fn base_address(&self, mask: &IpAddress) -> Result<Self, AddressError> {
        if self.family() != mask.family() {
            return Err(AddressError::FamilyMismatch(self.family(), mask.family()));
        }

        let segments: Vec<u32> = self
            .segments()
            .iter()
            .zip(mask.segments())
            .map(|(a, m)| a & m)
            .collect();

        Ok(Self::from_segments(self.family(), &segments))
    }

    /// Address `host_index` positions after this one.
    ///
    /// Addition runs from the least significant segment upwards, carrying
    /// overflow into the next segment. Overflow past the top segment wraps.
    pub fn offset(&self, host_index: u128) -> Self {
        let family = self.family();
        let modulus = 1u128 << family.segment_bits();
        let mut segments = self.segments();
        let mut carry = host_index;

        for segment in segments.iter_mut().rev() {
            if carry == 0 {
                break;
            }

            let sum = u128::from(*segment) + carry % modulus;
            *segment = (sum % modulus) as u32;
            carry = carry / modulus + sum / modulus;
        }

        Self::from_segments(family, &segments)
    }

    /// Number of addresses covered by a prefix: `2^(bit_width - prefix_len)`.
    ///
    /// Saturates at `u128::MAX` for an IPv6 `/0`.
    pub fn max_hosts(prefix_len: u32, bit_width: u32) -> u128 {
        let host_bits = bit_width.saturating_sub(prefix_len);
        1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
    }

    fn segments(&self) -> Vec<u32> {
        match self {
            Self::V4(octets) => octets.iter().map(|&o| u32::from(o)).collect(),
            Self::V6(groups) => groups.iter().map(|&g| u32::from(g)).collect(),
        }
    }

    fn from_segments(family: AddressFamily, segments: &[u32]) -> Self {
        match family {
            AddressFamily::V4 => {
                let mut octets = [0u8; 4];
                for (dst, &src) in octets.iter_mut().zip(segments) {
                    *dst = src as u8;
                }
                Self::V4(octets)
            }
            AddressFamily::V6 => {
                let mut groups = [0u16; 8];
                for (dst, &src) in groups.iter_mut().zip(segments) {
                    *dst = src as u16;
                }
                Self::V6(groups)
            }
        }
    }
}

impl FromStr for IpAddress {
    type Err = AddressError;

    /// Parse dotted IPv4 or colon-separated IPv6 text. The family is picked by
    /// the separator present in the input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();

        if text.contains(':') {
            Ipv6Addr::from_str(text)
                .map(Self::from)
                .map_err(|_| AddressError::InvalidFormat(s.to_string()))
        } else if text.contains('.') {
            Ipv4Addr::from_str(text)
                .map(Self::from)
                .map_err(|_| AddressError::InvalidFormat(s.to_string()))
        } else {
            Err(AddressError::InvalidFormat(s.to_string()))
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(octets) => write!(f, "{}", Ipv4Addr::from(*octets)),
            Self::V6(groups) => write!(f, "{}", Ipv6Addr::from(*groups)),
        }
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self::V4(ip.octets())
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(ip: Ipv6Addr) -> Self {
        Self::V6(ip.segments())
    }
}

impl From<IpAddr> for IpAddress {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

impl From<IpAddress> for IpAddr {
    fn from(ip: IpAddress) -> Self {
        match ip {
            IpAddress::V4(octets) => IpAddr::V4(Ipv4Addr::from(octets)),
            IpAddress::V6(groups) => IpAddr::V6(Ipv6Addr::from(groups)),
        }
    }
}

impl Serialize for IpAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
