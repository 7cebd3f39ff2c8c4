//! Single-host reachability and identity probe

use std::sync::Arc;
use tether_core::{EthernetDeviceInfo, EthernetProtocol, IpAddress, Result};
use tracing::trace;

use crate::resolver::NeighborResolver;
use crate::socket::EthernetSocket;

/// Probe timeout in milliseconds
pub const PROBE_TIMEOUT_MS: u32 = 2000;

/// Reachability check for one candidate host.
///
/// Probes run on blocking worker threads, so implementations may block up to
/// their own timeout.
pub trait HostProbe: Send + Sync {
    /// Identity of `ip` if it accepts a connection on `port`, `None` otherwise
    fn probe(&self, ip: IpAddress, port: u16, protocol: EthernetProtocol) -> Option<EthernetDeviceInfo>;
}

/// Probe that connects an [`EthernetSocket`] and reads back the resolved identity
pub struct SocketProbe {
    resolver: Arc<dyn NeighborResolver>,
    timeout_ms: u32,
}

impl SocketProbe {
    pub fn new(resolver: Arc<dyn NeighborResolver>, timeout_ms: u32) -> Self {
        Self {
            resolver,
            timeout_ms: timeout_ms.max(1),
        }
    }

    fn connect(&self, ip: IpAddress, port: u16, protocol: EthernetProtocol) -> Result<EthernetDeviceInfo> {
        let mut socket = EthernetSocket::new(self.resolver.clone());
        socket.initialize(ip, port, protocol)?;
        socket.set_timeout(self.timeout_ms)?;
        socket.connect()?;

        let info = EthernetDeviceInfo {
            hostname: socket.hostname().to_string(),
            ip,
            mac: socket.mac(),
            port,
            protocol,
        };
        socket.disconnect();
        Ok(info)
    }
}

impl HostProbe for SocketProbe {
    fn probe(&self, ip: IpAddress, port: u16, protocol: EthernetProtocol) -> Option<EthernetDeviceInfo> {
        match self.connect(ip, port, protocol) {
            Ok(info) => {
                trace!(ip = %ip, port, mac = %info.mac, "Host responded");
                Some(info)
            }
            Err(e) => {
                trace!(ip = %ip, port, error = %e, "Host not reachable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tether_core::{CommunicationError, MacAddress};

    struct LoopbackResolver;

    impl NeighborResolver for LoopbackResolver {
        fn mac_address(&self, ip: &IpAddress) -> Result<MacAddress> {
            if ip.to_string() == "127.0.0.1" {
                Ok(MacAddress([0x02, 0, 0, 0, 0, 0x01]))
            } else {
                Err(CommunicationError::Unreachable(ip.to_string()))
            }
        }

        fn hostname(&self, ip: &IpAddress) -> String {
            ip.to_string()
        }
    }

    #[test]
    fn test_probe_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = SocketProbe::new(Arc::new(LoopbackResolver), 500);
        let info = probe
            .probe("127.0.0.1".parse().unwrap(), port, EthernetProtocol::Tcp)
            .unwrap();
        assert_eq!(info.port, port);
        assert_eq!(info.hostname, "127.0.0.1");
        assert!(!info.mac.is_empty());
    }

    #[test]
    fn test_probe_closed_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = SocketProbe::new(Arc::new(LoopbackResolver), 500);
        assert!(probe
            .probe("127.0.0.1".parse().unwrap(), port, EthernetProtocol::Tcp)
            .is_none());
    }
}
