//! Local network interface enumeration
//!
//! Only interfaces that are up, Ethernet-class, carry a MAC address and have
//! at least one usable address are returned. The list is recomputed on every
//! call.

use serde::Serialize;
use std::fmt;
use tether_core::{IpAddress, MacAddress, NetworkTopology};
use tracing::{debug, trace};

/// A usable local network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    /// OS adapter identifier (interface name on Unix, index on Windows)
    pub adapter: String,
    /// Display name
    pub name: String,
    pub mac: MacAddress,
    /// First IPv4 unicast address and its subnet
    pub ipv4: Option<NetworkTopology>,
    /// First IPv6 unicast address and its subnet
    pub ipv6: Option<NetworkTopology>,
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.mac)?;
        if let Some(v4) = &self.ipv4 {
            write!(f, " {}/{}", v4.address, v4.prefix_len)?;
        }
        if let Some(v6) = &self.ipv6 {
            write!(f, " {}/{}", v6.address, v6.prefix_len)?;
        }
        Ok(())
    }
}

/// Assemble an interface record, returning `None` when it is incomplete
/// (empty MAC, or no address in either family).
pub fn build_interface(
    adapter: String,
    name: String,
    mac: MacAddress,
    ipv4: Option<(IpAddress, u32)>,
    ipv6: Option<(IpAddress, u32)>,
) -> Option<Interface> {
    if mac.is_empty() {
        trace!(interface = %name, "Skipping interface without MAC address");
        return None;
    }

    let topology = |entry: Option<(IpAddress, u32)>| {
        entry.and_then(|(address, prefix)| match NetworkTopology::new(address, prefix) {
            Ok(topology) => Some(topology),
            Err(e) => {
                trace!(interface = %name, address = %address, error = %e, "Ignoring address");
                None
            }
        })
    };

    let ipv4 = topology(ipv4);
    let ipv6 = topology(ipv6);

    if ipv4.is_none() && ipv6.is_none() {
        trace!(interface = %name, "Skipping interface without IP address");
        return None;
    }

    Some(Interface {
        adapter,
        name,
        mac,
        ipv4,
        ipv6,
    })
}

/// Enumerate usable local interfaces
#[cfg(unix)]
pub fn list_interfaces() -> Vec<Interface> {
    use pnet::datalink;

    let interfaces: Vec<Interface> = datalink::interfaces()
        .into_iter()
        .filter_map(|iface| {
            if !iface.is_up() || !iface.is_running() {
                trace!(interface = %iface.name, "Skipping interface that is not up");
                return None;
            }
            if iface.is_loopback() || iface.is_point_to_point() || !is_ethernet_link(&iface.name) {
                trace!(interface = %iface.name, "Skipping non-Ethernet interface");
                return None;
            }

            let mac = iface
                .mac
                .map(|datalink::MacAddr(a, b, c, d, e, f)| MacAddress([a, b, c, d, e, f]))
                .unwrap_or_default();

            let ipv4 = iface
                .ips
                .iter()
                .find(|network| network.is_ipv4())
                .map(|network| (IpAddress::from(network.ip()), u32::from(network.prefix())));
            let ipv6 = iface
                .ips
                .iter()
                .find(|network| network.is_ipv6())
                .map(|network| (IpAddress::from(network.ip()), u32::from(network.prefix())));

            build_interface(iface.name.clone(), iface.name, mac, ipv4, ipv6)
        })
        .collect();

    debug!("Found {} usable network interfaces", interfaces.len());
    interfaces
}

/// ARPHRD_ETHER link without a wireless extension
#[cfg(target_os = "linux")]
fn is_ethernet_link(name: &str) -> bool {
    let sysfs = std::path::Path::new("/sys/class/net").join(name);
    let link_type = std::fs::read_to_string(sysfs.join("type")).unwrap_or_default();
    link_type.trim() == "1" && !sysfs.join("wireless").exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_ethernet_link(_name: &str) -> bool {
    true
}

#[cfg(windows)]
pub fn list_interfaces() -> Vec<Interface> {
    use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
    use tracing::warn;

    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    let interfaces: Vec<Interface> = interfaces
        .into_iter()
        .filter_map(|iface| {
            let mac = iface
                .mac_addr
                .as_deref()
                .and_then(|mac| mac.parse().ok())
                .unwrap_or_default();

            let ipv4 = iface.addr.iter().find_map(|addr| match addr {
                Addr::V4(v4) => Some((
                    IpAddress::from(v4.ip),
                    v4.netmask.map(|m| u32::from(m).count_ones()).unwrap_or(24),
                )),
                _ => None,
            });
            let ipv6 = iface.addr.iter().find_map(|addr| match addr {
                Addr::V6(v6) => Some((
                    IpAddress::from(v6.ip),
                    v6.netmask.map(|m| u128::from(m).count_ones()).unwrap_or(64),
                )),
                _ => None,
            });

            build_interface(iface.index.to_string(), iface.name, mac, ipv4, ipv6)
        })
        .collect();

    debug!("Found {} usable network interfaces", interfaces.len());
    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddress = MacAddress([0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_interface_ipv4() {
        let iface = build_interface(
            "eth0".to_string(),
            "eth0".to_string(),
            MAC,
            Some((ip("192.168.1.10"), 24)),
            None,
        )
        .unwrap();

        let v4 = iface.ipv4.unwrap();
        assert_eq!(v4.base_address, ip("192.168.1.0"));
        assert_eq!(v4.max_hosts, 256);
        assert!(iface.ipv6.is_none());
        assert_eq!(iface.to_string(), "eth0 [02:42:AC:11:00:02] 192.168.1.10/24");
    }

    #[test]
    fn test_build_interface_ipv6_only() {
        let iface = build_interface(
            "eth1".to_string(),
            "eth1".to_string(),
            MAC,
            None,
            Some((ip("fe80::42:acff:fe11:2"), 64)),
        )
        .unwrap();
        assert!(iface.ipv4.is_none());
        assert_eq!(iface.ipv6.unwrap().base_address, ip("fe80::"));
    }

    #[test]
    fn test_build_interface_drops_missing_mac() {
        let iface = build_interface(
            "tun0".to_string(),
            "tun0".to_string(),
            MacAddress::default(),
            Some((ip("10.8.0.2"), 24)),
            None,
        );
        assert!(iface.is_none());
    }

    #[test]
    fn test_build_interface_drops_missing_address() {
        let iface = build_interface("eth2".to_string(), "eth2".to_string(), MAC, None, None);
        assert!(iface.is_none());
    }

    #[test]
    fn test_build_interface_ignores_bad_prefix() {
        let iface = build_interface(
            "eth3".to_string(),
            "eth3".to_string(),
            MAC,
            Some((ip("10.0.0.1"), 40)),
            None,
        );
        assert!(iface.is_none());
    }

    #[test]
    fn test_list_interfaces_invariants() {
        for iface in list_interfaces() {
            assert!(!iface.mac.is_empty());
            assert!(iface.ipv4.is_some() || iface.ipv6.is_some());
        }
    }
}
