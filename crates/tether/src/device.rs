//! Unified device handle over every transport backend

use std::fmt;
use tether_core::{
    CommunicationError, DeviceInfo, EndpointInfo, NativeHandle, Result, TransferConfiguration,
    Transport, TransportKind,
};
use tether_net::{EthernetCommunication, EthernetConfiguration, HttpCommunication, HttpConfiguration};
use tether_usb::{FtdiCommunication, FtdiConfiguration, LibUsbCommunication, UsbConfiguration};

/// An opened-or-closed session with one discovered device.
///
/// Not `Clone`: each value owns one native resource. Dropping it closes the
/// session.
pub enum DeviceCommunication {
    LibUsb(LibUsbCommunication),
    Ftdi(FtdiCommunication),
    Ethernet(EthernetCommunication),
    Http(HttpCommunication),
}

/// Backend configuration, one variant per transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Configuration {
    LibUsb(UsbConfiguration),
    Ftdi(FtdiConfiguration),
    Ethernet(EthernetConfiguration),
    Http(HttpConfiguration),
}

impl Configuration {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::LibUsb(_) => TransportKind::LibUsb,
            Self::Ftdi(_) => TransportKind::Ftdi,
            Self::Ethernet(_) => TransportKind::Ethernet,
            Self::Http(_) => TransportKind::Http,
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $device:ident => $body:expr) => {
        match $self {
            DeviceCommunication::LibUsb($device) => $body,
            DeviceCommunication::Ftdi($device) => $body,
            DeviceCommunication::Ethernet($device) => $body,
            DeviceCommunication::Http($device) => $body,
        }
    };
}

impl DeviceCommunication {
    pub fn kind(&self) -> TransportKind {
        dispatch!(self, device => device.kind())
    }

    /// Identity captured at discovery time
    pub fn info(&self) -> DeviceInfo {
        dispatch!(self, device => device.info())
    }

    pub fn configuration(&self) -> Configuration {
        match self {
            Self::LibUsb(device) => Configuration::LibUsb(*device.configuration()),
            Self::Ftdi(device) => Configuration::Ftdi(*device.configuration()),
            Self::Ethernet(device) => Configuration::Ethernet(*device.configuration()),
            Self::Http(device) => Configuration::Http(*device.configuration()),
        }
    }

    /// Replace the backend configuration. The variant must match the transport.
    pub fn set_configuration(&mut self, configuration: Configuration) -> Result<()> {
        match (self, configuration) {
            (Self::LibUsb(device), Configuration::LibUsb(c)) => device.set_configuration(c),
            (Self::Ftdi(device), Configuration::Ftdi(c)) => device.set_configuration(c),
            (Self::Ethernet(device), Configuration::Ethernet(c)) => device.set_configuration(c),
            (Self::Http(device), Configuration::Http(c)) => device.set_configuration(c),
            (device, configuration) => {
                return Err(CommunicationError::InvalidArgument(format!(
                    "{} configuration cannot be applied to a {} device",
                    configuration.kind(),
                    device.kind()
                )));
            }
        }
        Ok(())
    }

    pub fn open(&mut self) -> Result<()> {
        dispatch!(self, device => device.open())
    }

    pub fn is_open(&self) -> bool {
        dispatch!(self, device => device.is_open())
    }

    pub fn close(&mut self) {
        dispatch!(self, device => device.close())
    }

    pub fn endpoints(&self) -> Vec<EndpointInfo> {
        dispatch!(self, device => device.endpoints())
    }

    pub fn read(&mut self, transfer: &TransferConfiguration, buffer: &mut [u8]) -> Result<usize> {
        dispatch!(self, device => device.read(transfer, buffer))
    }

    pub fn write(&mut self, transfer: &TransferConfiguration, buffer: &[u8]) -> Result<usize> {
        dispatch!(self, device => device.write(transfer, buffer))
    }

    pub fn error_string(&self, code: i32) -> String {
        dispatch!(self, device => device.error_string(code))
    }

    pub fn native_handle(&self) -> Option<NativeHandle> {
        dispatch!(self, device => device.native_handle())
    }
}

impl fmt::Display for DeviceCommunication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind(), self.info())
    }
}

impl fmt::Debug for DeviceCommunication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCommunication")
            .field("kind", &self.kind())
            .field("info", &self.info())
            .field("open", &self.is_open())
            .finish()
    }
}

impl From<LibUsbCommunication> for DeviceCommunication {
    fn from(device: LibUsbCommunication) -> Self {
        Self::LibUsb(device)
    }
}

impl From<FtdiCommunication> for DeviceCommunication {
    fn from(device: FtdiCommunication) -> Self {
        Self::Ftdi(device)
    }
}

impl From<EthernetCommunication> for DeviceCommunication {
    fn from(device: EthernetCommunication) -> Self {
        Self::Ethernet(device)
    }
}

impl From<HttpCommunication> for DeviceCommunication {
    fn from(device: HttpCommunication) -> Self {
        Self::Http(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_core::{EthernetDeviceInfo, EthernetProtocol, HttpVerb, MacAddress};
    use tether_net::SystemResolver;

    fn info(port: u16) -> EthernetDeviceInfo {
        EthernetDeviceInfo {
            hostname: "sensor".to_string(),
            ip: "127.0.0.1".parse().unwrap(),
            mac: MacAddress([0x02, 0, 0, 0, 0, 0x07]),
            port,
            protocol: EthernetProtocol::Tcp,
        }
    }

    #[test]
    fn test_configuration_variant_must_match() {
        let mut device: DeviceCommunication =
            EthernetCommunication::new(info(502), Arc::new(SystemResolver)).into();

        let err = device
            .set_configuration(Configuration::Http(HttpConfiguration::default()))
            .unwrap_err();
        assert!(matches!(err, CommunicationError::InvalidArgument(_)));

        device
            .set_configuration(Configuration::Ethernet(EthernetConfiguration { timeout_ms: 150 }))
            .unwrap();
        assert_eq!(
            device.configuration(),
            Configuration::Ethernet(EthernetConfiguration { timeout_ms: 150 })
        );
    }

    #[test]
    fn test_dispatch_to_backend() {
        let mut device: DeviceCommunication = HttpCommunication::new(info(8080)).into();
        assert_eq!(device.kind(), TransportKind::Http);
        assert!(!device.is_open());
        assert!(device.native_handle().is_none());
        assert_eq!(device.to_string(), "[http] sensor 127.0.0.1:8080 (TCP) [02:00:00:00:00:07]");

        let mut buf = [0u8; 4];
        assert!(matches!(
            device.read(&TransferConfiguration::Bulk { endpoint: 1 }, &mut buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
        assert!(matches!(
            device.read(&TransferConfiguration::http(HttpVerb::Get, "/"), &mut buf),
            Err(CommunicationError::NotConnected)
        ));

        device.close();
        device.close();
        assert!(!device.is_open());
    }
}
