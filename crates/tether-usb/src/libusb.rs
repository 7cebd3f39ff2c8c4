//! Generic USB transport over libusb

use rusb::DeviceHandle;
use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::time::Duration;
use tether_core::error::check_buffer;
use tether_core::transport::unsupported;
use tether_core::{
    CommunicationError, DeviceInfo, EndpointInfo, NativeHandle, Result, TransferConfiguration,
    Transport, TransportKind, UsbDeviceInfo, UsbIdentification,
};
use tracing::{debug, info, warn};

use crate::context::UsbContext;
use crate::device::{enumerate, find_device, read_endpoints};
use crate::error::{error_name, native};
use crate::ftdi::FTDI_VENDOR_ID;

/// Direction bit of an endpoint address or control request type
pub(crate) const ENDPOINT_IN: u8 = 0x80;

pub const DEFAULT_TRANSFER_TIMEOUT_MS: u32 = 2000;

fn default_timeout_ms() -> u32 {
    DEFAULT_TRANSFER_TIMEOUT_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbConfiguration {
    /// Per-transfer timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,

    /// Interface to claim on open, if any
    #[serde(default)]
    pub interface: Option<u8>,
}

impl Default for UsbConfiguration {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            interface: None,
        }
    }
}

/// Enumerate non-FTDI devices matching any of `criteria`
pub fn devices(context: &UsbContext, criteria: &[UsbIdentification]) -> Vec<UsbDeviceInfo> {
    let found = enumerate(context, criteria, |vendor_id| vendor_id != FTDI_VENDOR_ID);
    debug!(count = found.len(), "libusb enumeration complete");
    found
}

/// Session with one device driven through libusb directly
pub struct LibUsbCommunication {
    context: UsbContext,
    info: UsbDeviceInfo,
    configuration: UsbConfiguration,
    handle: Option<DeviceHandle<rusb::Context>>,
    claimed: Option<u8>,
}

impl LibUsbCommunication {
    pub fn new(context: UsbContext, info: UsbDeviceInfo) -> Self {
        Self {
            context,
            info,
            configuration: UsbConfiguration::default(),
            handle: None,
            claimed: None,
        }
    }

    pub fn device(&self) -> &UsbDeviceInfo {
        &self.info
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.configuration.timeout_ms))
    }

    fn check_transfer(&self, transfer: &TransferConfiguration) -> Result<()> {
        match transfer {
            TransferConfiguration::Bulk { .. }
            | TransferConfiguration::Control { .. }
            | TransferConfiguration::Interrupt { .. } => Ok(()),
            other => Err(unsupported(TransportKind::LibUsb, other)),
        }
    }

    fn handle(&self) -> Result<&DeviceHandle<rusb::Context>> {
        self.handle.as_ref().ok_or(CommunicationError::NotConnected)
    }
}

impl Transport for LibUsbCommunication {
    type Configuration = UsbConfiguration;

    fn kind(&self) -> TransportKind {
        TransportKind::LibUsb
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::Usb(self.info.clone())
    }

    fn configuration(&self) -> &UsbConfiguration {
        &self.configuration
    }

    fn set_configuration(&mut self, configuration: UsbConfiguration) {
        self.configuration = configuration;
    }

    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let device = find_device(&self.context, &self.info)?;
        let handle = device.open().map_err(native)?;

        if let Some(interface) = self.configuration.interface {
            // Not every platform supports detaching kernel drivers
            let _ = handle.set_auto_detach_kernel_driver(true);
            handle.claim_interface(interface).map_err(native)?;
            self.claimed = Some(interface);
        }

        self.handle = Some(handle);
        info!(device = %self.info, "USB device opened");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Some(interface) = self.claimed.take() {
            if let Err(e) = handle.release_interface(interface) {
                warn!(device = %self.info, interface, error = %e, "Failed to release interface");
            }
        }
        debug!(device = %self.info, "USB device closed");
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        match &self.handle {
            Some(handle) => read_endpoints(&handle.device()),
            None => Vec::new(),
        }
    }

    fn read(&mut self, transfer: &TransferConfiguration, buffer: &mut [u8]) -> Result<usize> {
        self.check_transfer(transfer)?;
        check_buffer(buffer.len())?;
        let timeout = self.timeout();
        let handle = self.handle()?;

        let result = match *transfer {
            TransferConfiguration::Bulk { endpoint } => {
                handle.read_bulk(endpoint | ENDPOINT_IN, buffer, timeout)
            }
            TransferConfiguration::Interrupt { endpoint } => {
                handle.read_interrupt(endpoint | ENDPOINT_IN, buffer, timeout)
            }
            TransferConfiguration::Control {
                request_type,
                request,
                value,
                index,
            } => handle.read_control(request_type | ENDPOINT_IN, request, value, index, buffer, timeout),
            _ => return Err(unsupported(TransportKind::LibUsb, transfer)),
        };

        result.map_err(|e| {
            debug!(device = %self.info, transfer = transfer.kind_name(), error = %e, "USB read failed");
            native(e)
        })
    }

    fn write(&mut self, transfer: &TransferConfiguration, buffer: &[u8]) -> Result<usize> {
        self.check_transfer(transfer)?;
        check_buffer(buffer.len())?;
        let timeout = self.timeout();
        let handle = self.handle()?;

        let result = match *transfer {
            TransferConfiguration::Bulk { endpoint } => {
                handle.write_bulk(endpoint & !ENDPOINT_IN, buffer, timeout)
            }
            TransferConfiguration::Interrupt { endpoint } => {
                handle.write_interrupt(endpoint & !ENDPOINT_IN, buffer, timeout)
            }
            TransferConfiguration::Control {
                request_type,
                request,
                value,
                index,
            } => handle.write_control(request_type & !ENDPOINT_IN, request, value, index, buffer, timeout),
            _ => return Err(unsupported(TransportKind::LibUsb, transfer)),
        };

        result.map_err(|e| {
            debug!(device = %self.info, transfer = transfer.kind_name(), error = %e, "USB write failed");
            native(e)
        })
    }

    fn error_string(&self, code: i32) -> String {
        error_name(code).to_string()
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        self.handle
            .as_ref()
            .map(|handle| NativeHandle::Usb(handle.as_raw() as *mut c_void))
    }
}

impl Drop for LibUsbCommunication {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::HttpVerb;

    #[test]
    fn test_configuration_defaults() {
        let config: UsbConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, UsbConfiguration::default());
        assert_eq!(config.timeout_ms, 2000);
        assert_eq!(config.interface, None);
    }

    // The remaining tests need a libusb context but no attached hardware.

    fn unopened() -> Option<LibUsbCommunication> {
        let context = UsbContext::new().ok()?;
        let info = UsbDeviceInfo {
            port: "1:2".to_string(),
            vendor_id: 0x1234,
            product_id: 0x5678,
            ..Default::default()
        };
        Some(LibUsbCommunication::new(context, info))
    }

    #[test]
    fn test_transfer_checks_before_open() {
        let Some(mut dev) = unopened() else {
            return;
        };
        let mut buf = [0u8; 8];

        assert!(matches!(
            dev.read(&TransferConfiguration::Stream, &mut buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
        assert!(matches!(
            dev.write(&TransferConfiguration::http(HttpVerb::Put, "/x"), &buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
        assert!(matches!(
            dev.read(&TransferConfiguration::Bulk { endpoint: 1 }, &mut []),
            Err(CommunicationError::InvalidArgument(_))
        ));
        assert!(matches!(
            dev.read(&TransferConfiguration::Bulk { endpoint: 1 }, &mut buf),
            Err(CommunicationError::NotConnected)
        ));
        assert!(dev.endpoints().is_empty());
        assert!(dev.native_handle().is_none());
        dev.close();
        assert!(!dev.is_open());
    }

    #[test]
    fn test_open_missing_device() {
        let Some(mut dev) = unopened() else {
            return;
        };
        assert!(dev.open().is_err());
        assert!(!dev.is_open());
    }

    #[test]
    fn test_open_empty_port() {
        let Ok(context) = UsbContext::new() else {
            return;
        };
        let mut dev = LibUsbCommunication::new(context, UsbDeviceInfo::default());
        assert!(matches!(dev.open(), Err(CommunicationError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_criteria_finds_nothing() {
        let Ok(context) = UsbContext::new() else {
            return;
        };
        assert!(devices(&context, &[]).is_empty());
    }
}
