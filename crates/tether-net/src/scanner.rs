//! Ethernet discovery engine
//!
//! Subnet scans fan probes out onto blocking worker threads in waves: up to
//! `max_concurrent` probes are launched, the whole wave is joined, then the
//! next wave starts. Matches are collected behind a single mutex that is only
//! held for the append.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tether_core::{
    glob_match, EthernetDeviceInfo, EthernetIdentification, IpAddress, Matches, NetworkTopology,
    WILDCARD,
};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::interface::Interface;
use crate::probe::{HostProbe, PROBE_TIMEOUT_MS};

/// Upper bound on probes in flight at once
pub const MAX_CONCURRENT_PROBES: usize = 256;

fn default_probe_timeout_ms() -> u32 {
    PROBE_TIMEOUT_MS
}

fn default_max_concurrent_probes() -> usize {
    MAX_CONCURRENT_PROBES
}

/// Scanner configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Connect/read/write timeout for each probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u32,
    /// Probes per wave, capped at [`MAX_CONCURRENT_PROBES`]
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

/// Finds Ethernet hosts matching identification criteria
pub struct EthernetScanner {
    probe: Arc<dyn HostProbe>,
    max_concurrent: usize,
}

impl EthernetScanner {
    pub fn new(probe: Arc<dyn HostProbe>, max_concurrent: usize) -> Self {
        Self {
            probe,
            max_concurrent: max_concurrent.clamp(1, MAX_CONCURRENT_PROBES),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Discover hosts matching `criteria`.
    ///
    /// A wildcard or glob IP scans the IPv4 subnet of every interface; a
    /// concrete IP probes only that host. Unreachable hosts are omitted.
    pub async fn discover(
        &self,
        interfaces: &[Interface],
        criteria: &EthernetIdentification,
    ) -> Vec<EthernetDeviceInfo> {
        if criteria.port == 0 {
            warn!(ip = %criteria.ip, "Ethernet criteria without a port cannot be probed");
            return Vec::new();
        }

        if !criteria.is_subnet_scan() {
            return match criteria.ip.trim().parse::<IpAddress>() {
                Ok(ip) => self.probe_host(ip, criteria).await.into_iter().collect(),
                Err(e) => {
                    warn!(error = %e, "Ignoring Ethernet criteria with invalid IP");
                    Vec::new()
                }
            };
        }

        let mut scanned = HashSet::new();
        let mut devices = Vec::new();

        for interface in interfaces {
            let Some(topology) = &interface.ipv4 else {
                trace!(interface = %interface.name, "No IPv4 subnet to scan");
                continue;
            };

            if !scanned.insert((topology.base_address, topology.prefix_len)) {
                continue;
            }

            devices.extend(self.scan_subnet(topology, criteria).await);
        }

        dedupe(devices)
    }

    /// Probe every host of `topology`, excluding the network and broadcast addresses
    pub async fn scan_subnet(
        &self,
        topology: &NetworkTopology,
        criteria: &EthernetIdentification,
    ) -> Vec<EthernetDeviceInfo> {
        let results: Arc<Mutex<Vec<EthernetDeviceInfo>>> = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = JoinSet::new();
        let mut launched: u128 = 0;

        info!(
            subnet = %topology.base_address,
            prefix = topology.prefix_len,
            port = criteria.port,
            "Scanning subnet"
        );

        for index in topology.host_indices() {
            let ip = topology.host(index);
            if !ip_allowed(criteria, &ip) {
                continue;
            }

            let probe = self.probe.clone();
            let results = results.clone();
            let criteria = criteria.clone();
            tasks.spawn_blocking(move || {
                let Some(info) = probe.probe(ip, criteria.port, criteria.protocol) else {
                    return;
                };
                if criteria.matches(&info) {
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(info);
                }
            });
            launched += 1;

            if tasks.len() >= self.max_concurrent {
                join_wave(&mut tasks).await;
            }
        }
        join_wave(&mut tasks).await;

        let mut devices = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        devices.sort_by_key(|device| device.ip);

        debug!(
            subnet = %topology.base_address,
            probed = launched,
            found = devices.len(),
            "Subnet scan complete"
        );
        devices
    }

    async fn probe_host(
        &self,
        ip: IpAddress,
        criteria: &EthernetIdentification,
    ) -> Option<EthernetDeviceInfo> {
        let probe = self.probe.clone();
        let (port, protocol) = (criteria.port, criteria.protocol);

        let info = match tokio::task::spawn_blocking(move || probe.probe(ip, port, protocol)).await {
            Ok(info) => info?,
            Err(e) => {
                debug!(ip = %ip, error = %e, "Probe task failed");
                return None;
            }
        };

        criteria.matches(&info).then_some(info)
    }
}

async fn join_wave(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            debug!(error = %e, "Probe task failed");
        }
    }
}

/// Skip candidates a glob IP pattern already rules out
fn ip_allowed(criteria: &EthernetIdentification, ip: &IpAddress) -> bool {
    let pattern = criteria.ip.trim();
    pattern.is_empty() || pattern == WILDCARD || pattern == "0.0.0.0" || glob_match(pattern, &ip.to_string())
}

/// Drop repeated identities, keeping the first occurrence
pub fn dedupe(devices: Vec<EthernetDeviceInfo>) -> Vec<EthernetDeviceInfo> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|device| seen.insert((device.mac, device.ip, device.port, device.protocol)))
        .collect()
}
