//! Subnet shape derived from an interface address and prefix length

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::address::{AddressError, IpAddress};

/// Derived subnet of one interface address.
///
/// `base_address == address & mask` and
/// `max_hosts == 2^(bit_width - prefix_len)` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    /// Interface address
    pub address: IpAddress,
    /// Subnet mask
    pub mask: IpAddress,
    /// Mask prefix length
    pub prefix_len: u32,
    /// Network (base) address
    pub base_address: IpAddress,
    /// Number of addresses in the subnet, network and broadcast included
    pub max_hosts: u128,
}

impl NetworkTopology {
    /// Compute the topology for `address/prefix_len`
    pub fn new(address: IpAddress, prefix_len: u32) -> Result<Self, AddressError> {
        let family = address.family();
        let mask = IpAddress::mask(family, prefix_len)?;
        let base_address = address.base_address(&mask)?;
        let max_hosts = IpAddress::max_hosts(prefix_len, family.bit_width());

        Ok(Self {
            address,
            mask,
            prefix_len,
            base_address,
            max_hosts,
        })
    }

    /// Address of the host at `index` within the subnet
    pub fn host(&self, index: u128) -> IpAddress {
        self.base_address.offset(index)
    }

    /// Scannable host indices, excluding the network and broadcast addresses.
    ///
    /// Empty for /31, /32 and their IPv6 equivalents.
    pub fn host_indices(&self) -> Range<u128> {
        if self.max_hosts <= 2 {
            return 0..0;
        }
        1..self.max_hosts - 1
    }

    /// Iterator over every scannable host address
    pub fn hosts(&self) -> impl Iterator<Item = IpAddress> + '_ {
        self.host_indices().map(move |index| self.host(index))
    }

    /// Whether `ip` falls inside this subnet
    pub fn contains(&self, ip: &IpAddress) -> bool {
        ip.family() == self.address.family()
            && ip
                .base_address(&self.mask)
                .map(|base| base == self.base_address)
                .unwrap_or(false)
    }
}
