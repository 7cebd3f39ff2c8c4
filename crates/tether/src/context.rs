//! Native contexts owned by a device manager

use std::sync::Arc;
use tether_net::{
    list_interfaces, EthernetScanner, HostProbe, Interface, NeighborResolver, ScannerConfig,
    SocketProbe,
};

/// Everything Ethernet discovery needs: a neighbor resolver, scan limits,
/// and the interfaces to scan from.
pub struct EthernetContext {
    resolver: Arc<dyn NeighborResolver>,
    config: ScannerConfig,
    scanner: EthernetScanner,
    interfaces: Option<Vec<Interface>>,
}

impl EthernetContext {
    pub fn new(resolver: Arc<dyn NeighborResolver>, config: ScannerConfig) -> Self {
        let probe = Arc::new(SocketProbe::new(resolver.clone(), config.probe_timeout_ms));
        Self::with_probe(resolver, config, probe)
    }

    /// Use `probe` instead of connecting real sockets
    pub fn with_probe(
        resolver: Arc<dyn NeighborResolver>,
        config: ScannerConfig,
        probe: Arc<dyn HostProbe>,
    ) -> Self {
        Self {
            resolver,
            config,
            scanner: EthernetScanner::new(probe, config.max_concurrent_probes),
            interfaces: None,
        }
    }

    /// Scan from a fixed interface list instead of enumerating the host's
    pub fn with_interfaces(mut self, interfaces: Vec<Interface>) -> Self {
        self.interfaces = Some(interfaces);
        self
    }

    pub fn resolver(&self) -> Arc<dyn NeighborResolver> {
        self.resolver.clone()
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn scanner(&self) -> &EthernetScanner {
        &self.scanner
    }

    /// Interfaces to scan, enumerated afresh unless fixed
    pub fn interfaces(&self) -> Vec<Interface> {
        match &self.interfaces {
            Some(interfaces) => interfaces.clone(),
            None => list_interfaces(),
        }
    }
}
