//! Contract implemented by every transport backend

use std::ffi::c_void;

use crate::error::{CommunicationError, Result};
use crate::identification::DeviceInfo;
use crate::transfer::{EndpointInfo, TransferConfiguration, TransportKind};

/// Raw native resource behind an open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeHandle {
    /// OS socket descriptor
    Socket(u64),
    /// libusb device handle pointer
    Usb(*mut c_void),
}

/// Lifecycle and transfer operations shared by all backends.
///
/// Implementors own exactly one native resource and are neither `Clone` nor
/// `Copy`. `close` is idempotent and must also run on drop. `read` and
/// `write` fail with [`CommunicationError::NotConnected`] unless the handle
/// is open.
pub trait Transport {
    type Configuration: Clone;

    fn kind(&self) -> TransportKind;

    /// Identity captured at discovery time
    fn info(&self) -> DeviceInfo;

    fn configuration(&self) -> &Self::Configuration;

    /// Replace the configuration. Takes effect on the next `open`.
    fn set_configuration(&mut self, configuration: Self::Configuration);

    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn close(&mut self);

    fn endpoints(&self) -> Vec<EndpointInfo>;

    /// Read into `buffer`, returning the number of bytes received
    fn read(&mut self, transfer: &TransferConfiguration, buffer: &mut [u8]) -> Result<usize>;

    /// Write `buffer`, returning the number of bytes sent
    fn write(&mut self, transfer: &TransferConfiguration, buffer: &[u8]) -> Result<usize>;

    /// Human readable text for a backend error code
    fn error_string(&self, code: i32) -> String;

    fn native_handle(&self) -> Option<NativeHandle>;
}

/// Error for a transfer shape the backend does not carry
pub fn unsupported(kind: TransportKind, transfer: &TransferConfiguration) -> CommunicationError {
    CommunicationError::UnsupportedTransferKind {
        transport: kind.name(),
        transfer: transfer.kind_name(),
    }
}
