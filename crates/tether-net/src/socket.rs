//! TCP/UDP socket primitive with peer identity resolution
//!
//! Lifecycle: uninitialized -> initialized -> connected -> closed. A
//! successful `connect` also resolves the peer hostname (best effort) and MAC
//! address (required).

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tether_core::error::check_buffer;
use tether_core::{CommunicationError, EthernetProtocol, IpAddress, MacAddress, Result};
use tracing::{debug, trace};

use crate::resolver::NeighborResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Uninitialized,
    Initialized,
    Connected,
    Closed,
}

pub struct EthernetSocket {
    resolver: Arc<dyn NeighborResolver>,
    socket: Option<Socket>,
    state: SocketState,
    address: Option<SocketAddr>,
    protocol: EthernetProtocol,
    timeout: Option<Duration>,
    hostname: String,
    mac: MacAddress,
}

impl EthernetSocket {
    pub fn new(resolver: Arc<dyn NeighborResolver>) -> Self {
        Self {
            resolver,
            socket: None,
            state: SocketState::Uninitialized,
            address: None,
            protocol: EthernetProtocol::Tcp,
            timeout: None,
            hostname: String::new(),
            mac: MacAddress::default(),
        }
    }

    /// Create the native socket for `address:port`.
    ///
    /// Any previous socket is closed first.
    pub fn initialize(&mut self, address: IpAddress, port: u16, protocol: EthernetProtocol) -> Result<()> {
        self.disconnect();

        let target = SocketAddr::new(IpAddr::from(address), port);
        let (kind, proto) = match protocol {
            EthernetProtocol::Tcp => (Type::STREAM, Protocol::TCP),
            EthernetProtocol::Udp => (Type::DGRAM, Protocol::UDP),
        };

        let socket = Socket::new(Domain::for_address(target), kind, Some(proto)).map_err(|e| {
            CommunicationError::Resource(format!("failed to create {} socket for {}: {}", protocol, target, e))
        })?;

        self.socket = Some(socket);
        self.address = Some(target);
        self.protocol = protocol;
        self.hostname.clear();
        self.mac = MacAddress::default();
        self.state = SocketState::Initialized;

        if let Some(timeout) = self.timeout {
            self.apply_timeout(timeout)?;
        }

        trace!(address = %target, protocol = %protocol, "Socket initialized");
        Ok(())
    }

    /// Set the send and receive timeout. Also bounds TCP connect.
    pub fn set_timeout(&mut self, timeout_ms: u32) -> Result<()> {
        if timeout_ms == 0 {
            return Err(CommunicationError::InvalidArgument(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let timeout = Duration::from_millis(u64::from(timeout_ms));
        self.timeout = Some(timeout);
        self.apply_timeout(timeout)
    }

    fn apply_timeout(&self, timeout: Duration) -> Result<()> {
        if let Some(socket) = &self.socket {
            socket.set_read_timeout(Some(timeout))?;
            socket.set_write_timeout(Some(timeout))?;
        }
        Ok(())
    }

    /// Connect to the peer and resolve its identity. No-op when already connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == SocketState::Connected {
            return Ok(());
        }

        let (Some(socket), Some(target)) = (&self.socket, self.address) else {
            return Err(CommunicationError::Resource(
                "socket is not initialized".to_string(),
            ));
        };

        let peer = SockAddr::from(target);
        let connected = match (self.protocol, self.timeout) {
            (EthernetProtocol::Tcp, Some(timeout)) => socket.connect_timeout(&peer, timeout),
            _ => socket.connect(&peer),
        };

        if let Err(e) = connected {
            trace!(address = %target, error = %e, "Connect failed");
            self.disconnect();
            return Err(CommunicationError::Unreachable(format!("{}: {}", target, e)));
        }

        let ip = IpAddress::from(target.ip());
        self.hostname = self.resolver.hostname(&ip);

        match self.resolver.mac_address(&ip) {
            Ok(mac) => self.mac = mac,
            Err(e) => {
                debug!(address = %target, error = %e, "MAC resolution failed");
                self.disconnect();
                return Err(e);
            }
        }

        self.state = SocketState::Connected;
        trace!(address = %target, hostname = %self.hostname, mac = %self.mac, "Socket connected");
        Ok(())
    }

    /// Close the native socket. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            self.state = SocketState::Closed;
        }
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        check_buffer(buffer.len())?;
        let mut socket = self.connected_socket()?;
        Ok(socket.read(buffer)?)
    }

    pub fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        check_buffer(buffer.len())?;
        let mut socket = self.connected_socket()?;
        socket.write_all(buffer)?;
        Ok(buffer.len())
    }

    fn connected_socket(&self) -> Result<&Socket> {
        match (&self.socket, self.state) {
            (Some(socket), SocketState::Connected) => Ok(socket),
            _ => Err(CommunicationError::NotConnected),
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SocketState::Connected
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.address
    }

    pub fn protocol(&self) -> EthernetProtocol {
        self.protocol
    }

    /// Peer hostname, empty until connected
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Peer MAC address, all-zero until connected
    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Raw OS descriptor of the open socket
    pub fn raw_handle(&self) -> Option<u64> {
        self.socket.as_ref().and_then(raw_descriptor)
    }
}

#[cfg(unix)]
fn raw_descriptor(socket: &Socket) -> Option<u64> {
    use std::os::unix::io::AsRawFd;
    u64::try_from(socket.as_raw_fd()).ok()
}

#[cfg(windows)]
fn raw_descriptor(socket: &Socket) -> Option<u64> {
    use std::os::windows::io::AsRawSocket;
    Some(socket.as_raw_socket())
}

impl fmt::Display for EthernetSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(address) => write!(f, "{} ({})", address, self.protocol),
            None => write!(f, "<uninitialized>"),
        }
    }
}

impl fmt::Debug for EthernetSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthernetSocket")
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .field("state", &self.state)
            .field("hostname", &self.hostname)
            .field("mac", &self.mac)
            .finish()
    }
}

impl Drop for EthernetSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}
