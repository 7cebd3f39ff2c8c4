//! Neighbor (ARP/NDP) table access for MAC address resolution

use anyhow::Result;
use std::process::Command;
use tether_core::{IpAddress, MacAddress};
use tracing::{debug, trace};

/// Neighbor table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: IpAddress,
    /// `None` for incomplete entries
    pub mac: Option<MacAddress>,
    pub interface: String,
    pub state: NeighborState,
}

impl NeighborEntry {
    /// Usable MAC address, if the entry resolved to one
    pub fn resolved_mac(&self) -> Option<MacAddress> {
        match self.state {
            NeighborState::Failed | NeighborState::Incomplete => None,
            _ => self.mac.filter(|mac| !mac.is_empty()),
        }
    }
}

/// Neighbor entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    Incomplete,
    Permanent,
    Unknown,
}

/// Current neighbor table
#[cfg(target_os = "linux")]
pub fn neighbor_table() -> Result<Vec<NeighborEntry>> {
    let entries: Vec<NeighborEntry> = match Command::new("ip").args(["neigh", "show"]).output() {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout.lines().filter_map(parse_ip_neigh_line).collect()
        }
        _ => {
            // iproute2 missing (minimal containers), read the kernel table directly
            let table = std::fs::read_to_string("/proc/net/arp")?;
            table.lines().skip(1).filter_map(parse_proc_arp_line).collect()
        }
    };

    trace!("Found {} neighbor entries", entries.len());
    Ok(entries)
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn neighbor_table() -> Result<Vec<NeighborEntry>> {
    let output = Command::new("arp").arg("-an").output()?;

    if !output.status.success() {
        anyhow::bail!("Failed to get ARP table: {}", String::from_utf8_lossy(&output.stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries: Vec<NeighborEntry> = stdout.lines().filter_map(parse_bsd_arp_line).collect();

    trace!("Found {} neighbor entries", entries.len());
    Ok(entries)
}

#[cfg(windows)]
pub fn neighbor_table() -> Result<Vec<NeighborEntry>> {
    let output = Command::new("arp").arg("-a").output()?;

    if !output.status.success() {
        anyhow::bail!("Failed to get ARP table: {}", String::from_utf8_lossy(&output.stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries = parse_windows_arp_table(&stdout);

    trace!("Found {} neighbor entries", entries.len());
    Ok(entries)
}

/// Look up the MAC address of `ip` in the neighbor table
pub fn lookup_mac(ip: &IpAddress) -> Option<MacAddress> {
    match neighbor_table() {
        Ok(entries) => entries
            .iter()
            .filter(|entry| &entry.ip == ip)
            .find_map(NeighborEntry::resolved_mac),
        Err(e) => {
            debug!(error = %e, "Failed to read neighbor table");
            None
        }
    }
}

/// Parse a line from `ip neigh show` output
fn parse_ip_neigh_line(line: &str) -> Option<NeighborEntry> {
    // Format: "192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 4 {
        return None;
    }

    let ip: IpAddress = parts[0].parse().ok()?;

    let dev_idx = parts.iter().position(|&p| p == "dev")?;
    let interface = parts.get(dev_idx + 1)?.to_string();

    // No lladdr for INCOMPLETE/FAILED entries
    let mac = parts
        .iter()
        .position(|&p| p == "lladdr")
        .and_then(|idx| parts.get(idx + 1))
        .and_then(|s| s.parse().ok());

    let state = parts.last().map(|s| parse_neighbor_state(s)).unwrap_or(NeighborState::Unknown);

    Some(NeighborEntry { ip, mac, interface, state })
}

/// Parse a data line of `/proc/net/arp`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_arp_line(line: &str) -> Option<NeighborEntry> {
    // Format: "192.168.1.1  0x1  0x2  aa:bb:cc:dd:ee:ff  *  eth0"
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 6 {
        return None;
    }

    let ip: IpAddress = parts[0].parse().ok()?;
    let flags = u32::from_str_radix(parts[2].trim_start_matches("0x"), 16).ok()?;
    let mac: Option<MacAddress> = parts[3].parse().ok();

    let state = if flags & 0x4 != 0 {
        NeighborState::Permanent
    } else if flags & 0x2 != 0 {
        NeighborState::Reachable
    } else {
        NeighborState::Incomplete
    };

    Some(NeighborEntry {
        ip,
        mac,
        interface: parts[5].to_string(),
        state,
    })
}

/// Parse a line from BSD/macOS `arp -an` output
#[cfg_attr(not(all(unix, not(target_os = "linux"))), allow(dead_code))]
fn parse_bsd_arp_line(line: &str) -> Option<NeighborEntry> {
    // Format: "? (192.168.1.1) at 0:1b:44:11:3a:b7 on en0 ifscope [ethernet]"
    let open = line.find('(')?;
    let close = line[open..].find(')')? + open;
    let ip: IpAddress = line[open + 1..close].parse().ok()?;

    let parts: Vec<&str> = line[close + 1..].split_whitespace().collect();
    let mac_text = parts
        .iter()
        .position(|&p| p == "at")
        .and_then(|idx| parts.get(idx + 1))?;
    let interface = parts
        .iter()
        .position(|&p| p == "on")
        .and_then(|idx| parts.get(idx + 1))
        .map(|s| s.to_string())
        .unwrap_or_default();

    let mac: Option<MacAddress> = mac_text.parse().ok();
    let state = if mac.is_none() {
        NeighborState::Incomplete
    } else if parts.contains(&"permanent") {
        NeighborState::Permanent
    } else {
        NeighborState::Reachable
    };

    Some(NeighborEntry { ip, mac, interface, state })
}

/// Parse the full output of Windows `arp -a`, which groups entries under
/// `Interface: <address> --- <index>` headers
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_windows_arp_table(output: &str) -> Vec<NeighborEntry> {
    let mut entries = Vec::new();
    let mut interface = String::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["Interface:", address, ..] => interface = address.to_string(),
            [ip, mac, kind] => {
                let (Ok(ip), Ok(mac)) = (ip.parse::<IpAddress>(), mac.parse::<MacAddress>()) else {
                    continue;
                };
                let state = match *kind {
                    "static" => NeighborState::Permanent,
                    "dynamic" => NeighborState::Reachable,
                    _ => NeighborState::Unknown,
                };
                entries.push(NeighborEntry {
                    ip,
                    mac: Some(mac),
                    interface: interface.clone(),
                    state,
                });
            }
            _ => {}
        }
    }

    entries
}

/// Map an `ip neigh` NUD state name
fn parse_neighbor_state(s: &str) -> NeighborState {
    match s.to_uppercase().as_str() {
        "REACHABLE" => NeighborState::Reachable,
        "STALE" => NeighborState::Stale,
        "DELAY" => NeighborState::Delay,
        "PROBE" => NeighborState::Probe,
        "FAILED" => NeighborState::Failed,
        "INCOMPLETE" => NeighborState::Incomplete,
        "PERMANENT" => NeighborState::Permanent,
        _ => NeighborState::Unknown,
    }
}
