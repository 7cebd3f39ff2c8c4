//! Raw socket transport for Ethernet devices

use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tether_core::error::check_buffer;
use tether_core::transport::unsupported;
use tether_core::{
    CommunicationError, DeviceInfo, EndpointDirection, EndpointInfo, EthernetDeviceInfo,
    NativeHandle, Result, TransferConfiguration, Transport, TransportKind,
};
use tracing::{debug, info};

use crate::probe::PROBE_TIMEOUT_MS;
use crate::resolver::NeighborResolver;
use crate::socket::EthernetSocket;

fn default_timeout_ms() -> u32 {
    PROBE_TIMEOUT_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetConfiguration {
    /// Connect, read and write timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
}

impl Default for EthernetConfiguration {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Session with one discovered Ethernet host
pub struct EthernetCommunication {
    info: EthernetDeviceInfo,
    configuration: EthernetConfiguration,
    socket: EthernetSocket,
}

impl EthernetCommunication {
    pub fn new(info: EthernetDeviceInfo, resolver: Arc<dyn NeighborResolver>) -> Self {
        Self {
            info,
            configuration: EthernetConfiguration::default(),
            socket: EthernetSocket::new(resolver),
        }
    }

    pub fn device(&self) -> &EthernetDeviceInfo {
        &self.info
    }

    fn check_transfer(&self, transfer: &TransferConfiguration) -> Result<()> {
        match transfer {
            TransferConfiguration::Stream => Ok(()),
            other => Err(unsupported(TransportKind::Ethernet, other)),
        }
    }
}

impl Transport for EthernetCommunication {
    type Configuration = EthernetConfiguration;

    fn kind(&self) -> TransportKind {
        TransportKind::Ethernet
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::Ethernet(self.info.clone())
    }

    fn configuration(&self) -> &EthernetConfiguration {
        &self.configuration
    }

    fn set_configuration(&mut self, configuration: EthernetConfiguration) {
        self.configuration = configuration;
    }

    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        self.socket
            .initialize(self.info.ip, self.info.port, self.info.protocol)?;
        self.socket.set_timeout(self.configuration.timeout_ms)?;
        self.socket.connect()?;

        info!(device = %self.info, "Ethernet device opened");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_connected()
    }

    fn close(&mut self) {
        if self.is_open() {
            debug!(device = %self.info, "Closing Ethernet device");
        }
        self.socket.disconnect();
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        vec![EndpointInfo::new(EndpointDirection::Duplex, self.info.port)]
    }

    fn read(&mut self, transfer: &TransferConfiguration, buffer: &mut [u8]) -> Result<usize> {
        self.check_transfer(transfer)?;
        check_buffer(buffer.len())?;
        if !self.is_open() {
            return Err(CommunicationError::NotConnected);
        }
        self.socket.read(buffer)
    }

    fn write(&mut self, transfer: &TransferConfiguration, buffer: &[u8]) -> Result<usize> {
        self.check_transfer(transfer)?;
        check_buffer(buffer.len())?;
        if !self.is_open() {
            return Err(CommunicationError::NotConnected);
        }
        self.socket.write(buffer)
    }

    fn error_string(&self, code: i32) -> String {
        io::Error::from_raw_os_error(code).to_string()
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        self.socket.raw_handle().map(NativeHandle::Socket)
    }
}

impl Drop for EthernetCommunication {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use tether_core::{EthernetProtocol, HttpVerb, IpAddress, MacAddress};

    struct FixedResolver;

    impl NeighborResolver for FixedResolver {
        fn mac_address(&self, _ip: &IpAddress) -> Result<MacAddress> {
            Ok(MacAddress([0x02, 0, 0, 0, 0, 0x01]))
        }

        fn hostname(&self, ip: &IpAddress) -> String {
            ip.to_string()
        }
    }

    fn device(port: u16) -> EthernetCommunication {
        let info = EthernetDeviceInfo {
            hostname: "localhost".to_string(),
            ip: "127.0.0.1".parse().unwrap(),
            mac: MacAddress([0x02, 0, 0, 0, 0, 0x01]),
            port,
            protocol: EthernetProtocol::Tcp,
        };
        EthernetCommunication::new(info, Arc::new(FixedResolver))
    }

    #[test]
    fn test_open_transfer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(b"world").unwrap();
        });

        let mut dev = device(port);
        dev.open().unwrap();
        assert!(dev.is_open());
        assert!(dev.native_handle().is_some());
        assert_eq!(dev.endpoints(), vec![EndpointInfo::new(EndpointDirection::Duplex, port)]);

        assert_eq!(dev.write(&TransferConfiguration::Stream, b"hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        let mut received = 0;
        while received < buf.len() {
            received += dev.read(&TransferConfiguration::Stream, &mut buf[received..]).unwrap();
        }
        assert_eq!(&buf, b"world");

        dev.close();
        dev.close();
        assert!(!dev.is_open());
        assert!(dev.native_handle().is_none());
        server.join().unwrap();
    }

    #[test]
    fn test_rejects_usb_and_http_shapes() {
        let mut dev = device(1);
        let mut buf = [0u8; 4];
        assert!(matches!(
            dev.read(&TransferConfiguration::Bulk { endpoint: 1 }, &mut buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
        assert!(matches!(
            dev.write(&TransferConfiguration::http(HttpVerb::Post, "/"), &buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
    }

    #[test]
    fn test_transfer_requires_open() {
        let mut dev = device(1);
        let mut buf = [0u8; 4];
        assert!(matches!(
            dev.read(&TransferConfiguration::Stream, &mut buf),
            Err(CommunicationError::NotConnected)
        ));
        assert!(matches!(
            dev.write(&TransferConfiguration::Stream, &[]),
            Err(CommunicationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_open_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut dev = device(port);
        dev.set_configuration(EthernetConfiguration { timeout_ms: 300 });
        assert!(dev.open().is_err());
        assert!(!dev.is_open());
    }

    #[test]
    fn test_error_string() {
        let dev = device(1);
        assert!(!dev.error_string(111).is_empty());
    }
}
