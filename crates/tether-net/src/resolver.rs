//! Peer identity resolution used after a successful connect

use tether_core::{CommunicationError, IpAddress, MacAddress, Result};

use crate::{arp, hostname};

/// Resolves the link-layer and DNS identity of a connected peer
pub trait NeighborResolver: Send + Sync {
    /// MAC address of `ip`. Failing here fails the connect.
    fn mac_address(&self, ip: &IpAddress) -> Result<MacAddress>;

    /// Reverse-DNS name of `ip`, or its numeric form
    fn hostname(&self, ip: &IpAddress) -> String;
}

/// Resolver backed by the OS neighbor table and resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl NeighborResolver for SystemResolver {
    fn mac_address(&self, ip: &IpAddress) -> Result<MacAddress> {
        arp::lookup_mac(ip).ok_or_else(|| {
            CommunicationError::Unreachable(format!("{} has no neighbor table entry", ip))
        })
    }

    fn hostname(&self, ip: &IpAddress) -> String {
        hostname::reverse_lookup(ip)
    }
}
