//! FTDI transport speaking the FTDI vendor protocol over libusb

use rusb::{DeviceHandle, Direction};
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
use crate::libusb::{DEFAULT_TRANSFER_TIMEOUT_MS, ENDPOINT_IN};

pub const FTDI_VENDOR_ID: u16 = 0x0403;

const REQUEST_TYPE_OUT: u8 = 0x40;
const REQUEST_TYPE_IN: u8 = 0xC0;

pub const SIO_RESET: u8 = 0x00;
pub const SIO_SET_BITMODE: u8 = 0x0B;
pub const SIO_READ_PINS: u8 = 0x0C;

/// Bytes of modem status at the head of every bulk IN packet
const MODEM_STATUS_LEN: usize = 2;
const DEFAULT_PACKET_SIZE: usize = 64;

fn default_timeout_ms() -> u32 {
    DEFAULT_TRANSFER_TIMEOUT_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtdiConfiguration {
    #[serde(default)]
    pub bit_mode: u8,

    #[serde(default)]
    pub bit_mask: u8,

    /// Zero-based chip interface (0 is interface A)
    #[serde(default)]
    pub interface: u8,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
}

impl Default for FtdiConfiguration {
    fn default() -> Self {
        Self {
            bit_mode: 0,
            bit_mask: 0,
            interface: 0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl FtdiConfiguration {
    /// `wIndex` of vendor requests addressed to this interface
    pub fn request_index(&self) -> u16 {
        u16::from(self.interface) + 1
    }

    pub fn in_endpoint(&self) -> u8 {
        0x81 + 2 * self.interface
    }

    pub fn out_endpoint(&self) -> u8 {
        0x02 + 2 * self.interface
    }

    /// `wValue` of `SIO_SET_BITMODE`
    pub fn bitmode_value(&self) -> u16 {
        (u16::from(self.bit_mode) << 8) | u16::from(self.bit_mask)
    }
}

/// Copy payload bytes out of raw bulk IN data, skipping the modem status
/// pair that leads each `packet_size` packet. Returns bytes written to `out`.
pub fn strip_modem_status(raw: &[u8], packet_size: usize, out: &mut [u8]) -> usize {
    if packet_size <= MODEM_STATUS_LEN {
        return 0;
    }

    let mut written = 0;
    for packet in raw.chunks(packet_size) {
        if packet.len() <= MODEM_STATUS_LEN {
            continue;
        }
        let payload = &packet[MODEM_STATUS_LEN..];
        let count = payload.len().min(out.len() - written);
        out[written..written + count].copy_from_slice(&payload[..count]);
        written += count;
        if written == out.len() {
            break;
        }
    }
    written
}

/// Raw transfer size needed to receive `len` payload bytes
fn raw_read_size(len: usize, packet_size: usize) -> usize {
    let payload_per_packet = packet_size - MODEM_STATUS_LEN;
    len.div_ceil(payload_per_packet) * packet_size
}

/// Enumerate FTDI devices matching any of `criteria`
pub fn devices(context: &UsbContext, criteria: &[UsbIdentification]) -> Vec<UsbDeviceInfo> {
    let found = enumerate(context, criteria, |vendor_id| vendor_id == FTDI_VENDOR_ID);
    debug!(count = found.len(), "FTDI enumeration complete");
    found
}

/// Session with one FTDI chip
pub struct FtdiCommunication {
    context: UsbContext,
    info: UsbDeviceInfo,
    configuration: FtdiConfiguration,
    handle: Option<DeviceHandle<rusb::Context>>,
    packet_size: usize,
}

impl FtdiCommunication {
    pub fn new(context: UsbContext, info: UsbDeviceInfo) -> Self {
        Self {
            context,
            info,
            configuration: FtdiConfiguration::default(),
            handle: None,
            packet_size: DEFAULT_PACKET_SIZE,
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
            TransferConfiguration::Bulk { .. } | TransferConfiguration::Control { .. } => Ok(()),
            other => Err(unsupported(TransportKind::Ftdi, other)),
        }
    }

    fn handle(&self) -> Result<&DeviceHandle<rusb::Context>> {
        self.handle.as_ref().ok_or(CommunicationError::NotConnected)
    }

    /// Max packet size of the interface's bulk IN endpoint
    fn in_packet_size(&self, handle: &DeviceHandle<rusb::Context>) -> usize {
        let in_endpoint = self.configuration.in_endpoint();
        let Ok(config) = handle.device().active_config_descriptor() else {
            return DEFAULT_PACKET_SIZE;
        };

        for interface in config.interfaces() {
            for setting in interface.descriptors() {
                for endpoint in setting.endpoint_descriptors() {
                    let size = usize::from(endpoint.max_packet_size());
                    if endpoint.direction() == Direction::In
                        && endpoint.address() == in_endpoint
                        && size > MODEM_STATUS_LEN
                    {
                        return size;
                    }
                }
            }
        }
        DEFAULT_PACKET_SIZE
    }

    fn configure(&self, handle: &DeviceHandle<rusb::Context>) -> Result<()> {
        let index = self.configuration.request_index();
        let timeout = self.timeout();

        // Not every platform supports detaching kernel drivers
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle
            .claim_interface(self.configuration.interface)
            .map_err(native)?;
        handle
            .write_control(REQUEST_TYPE_OUT, SIO_RESET, 0, index, &[], timeout)
            .map_err(native)?;
        handle
            .write_control(
                REQUEST_TYPE_OUT,
                SIO_SET_BITMODE,
                self.configuration.bitmode_value(),
                index,
                &[],
                timeout,
            )
            .map_err(native)?;
        Ok(())
    }

    fn read_pins(&self, handle: &DeviceHandle<rusb::Context>, buffer: &mut [u8]) -> rusb::Result<usize> {
        handle.read_control(
            REQUEST_TYPE_IN,
            SIO_READ_PINS,
            0,
            self.configuration.request_index(),
            &mut buffer[..1],
            self.timeout(),
        )
    }
}

impl Transport for FtdiCommunication {
    type Configuration = FtdiConfiguration;

    fn kind(&self) -> TransportKind {
        TransportKind::Ftdi
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::Usb(self.info.clone())
    }

    fn configuration(&self) -> &FtdiConfiguration {
        &self.configuration
    }

    fn set_configuration(&mut self, configuration: FtdiConfiguration) {
        self.configuration = configuration;
    }

    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let device = find_device(&self.context, &self.info)?;
        let handle = device.open().map_err(native)?;

        if let Err(e) = self.configure(&handle) {
            warn!(device = %self.info, error = %e, "Failed to configure FTDI device");
            let _ = handle.release_interface(self.configuration.interface);
            return Err(e);
        }

        self.packet_size = self.in_packet_size(&handle);
        self.handle = Some(handle);
        info!(
            device = %self.info,
            bit_mode = self.configuration.bit_mode,
            bit_mask = self.configuration.bit_mask,
            "FTDI device opened"
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Err(e) = handle.release_interface(self.configuration.interface) {
            warn!(device = %self.info, error = %e, "Failed to release FTDI interface");
        }
        debug!(device = %self.info, "FTDI device closed");
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
        let handle = self.handle()?;
        let timeout = self.timeout();

        let result = match *transfer {
            TransferConfiguration::Bulk { .. } => {
                let mut raw = vec![0u8; raw_read_size(buffer.len(), self.packet_size)];
                handle
                    .read_bulk(self.configuration.in_endpoint(), &mut raw, timeout)
                    .map(|received| strip_modem_status(&raw[..received], self.packet_size, buffer))
            }
            TransferConfiguration::Control { request, .. } if request == SIO_READ_PINS => {
                self.read_pins(handle, buffer)
            }
            TransferConfiguration::Control {
                request_type,
                request,
                value,
                index,
            } => handle.read_control(request_type | ENDPOINT_IN, request, value, index, buffer, timeout),
            _ => return Err(unsupported(TransportKind::Ftdi, transfer)),
        };

        result.map_err(|e| {
            debug!(device = %self.info, transfer = transfer.kind_name(), error = %e, "FTDI read failed");
            native(e)
        })
    }

    fn write(&mut self, transfer: &TransferConfiguration, buffer: &[u8]) -> Result<usize> {
        self.check_transfer(transfer)?;
        check_buffer(buffer.len())?;
        let handle = self.handle()?;
        let timeout = self.timeout();

        let result = match *transfer {
            TransferConfiguration::Bulk { .. } => {
                handle.write_bulk(self.configuration.out_endpoint(), buffer, timeout)
            }
            TransferConfiguration::Control {
                request_type,
                request,
                value,
                index,
            } => handle.write_control(request_type & !ENDPOINT_IN, request, value, index, buffer, timeout),
            _ => return Err(unsupported(TransportKind::Ftdi, transfer)),
        };

        result.map_err(|e| {
            debug!(device = %self.info, transfer = transfer.kind_name(), error = %e, "FTDI write failed");
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

impl Drop for FtdiCommunication {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_addressing() {
        let a = FtdiConfiguration::default();
        assert_eq!(a.request_index(), 1);
        assert_eq!(a.in_endpoint(), 0x81);
        assert_eq!(a.out_endpoint(), 0x02);

        let b = FtdiConfiguration {
            interface: 1,
            ..Default::default()
        };
        assert_eq!(b.request_index(), 2);
        assert_eq!(b.in_endpoint(), 0x83);
        assert_eq!(b.out_endpoint(), 0x04);
    }

    #[test]
    fn test_bitmode_value() {
        let config = FtdiConfiguration {
            bit_mode: 0x01,
            bit_mask: 0xF0,
            ..Default::default()
        };
        assert_eq!(config.bitmode_value(), 0x01F0);
    }

    #[test]
    fn test_strip_modem_status() {
        // Two 4-byte packets: [status, status, a, b] [status, status, c, d]
        let raw = [0x31, 0x60, b'a', b'b', 0x31, 0x60, b'c', b'd'];
        let mut out = [0u8; 8];
        assert_eq!(strip_modem_status(&raw, 4, &mut out), 4);
        assert_eq!(&out[..4], b"abcd");
    }

    #[test]
    fn test_strip_modem_status_status_only() {
        let raw = [0x31, 0x60];
        let mut out = [0u8; 4];
        assert_eq!(strip_modem_status(&raw, 64, &mut out), 0);
    }

    #[test]
    fn test_strip_modem_status_truncates() {
        let raw = [0x31, 0x60, b'x', b'y', b'z'];
        let mut out = [0u8; 2];
        assert_eq!(strip_modem_status(&raw, 64, &mut out), 2);
        assert_eq!(&out, b"xy");
    }

    #[test]
    fn test_raw_read_size() {
        assert_eq!(raw_read_size(1, 64), 64);
        assert_eq!(raw_read_size(62, 64), 64);
        assert_eq!(raw_read_size(63, 64), 128);
    }

    #[test]
    fn test_rejects_unsupported_shapes() {
        let Ok(context) = UsbContext::new() else {
            return;
        };
        let mut dev = FtdiCommunication::new(context, UsbDeviceInfo::default());
        let mut buf = [0u8; 4];
        assert!(matches!(
            dev.read(&TransferConfiguration::Interrupt { endpoint: 1 }, &mut buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
        assert!(matches!(
            dev.write(&TransferConfiguration::Stream, &buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
        assert!(matches!(
            dev.read(&TransferConfiguration::Bulk { endpoint: 1 }, &mut buf),
            Err(CommunicationError::NotConnected)
        ));
        assert_eq!(dev.kind(), TransportKind::Ftdi);
    }
}
