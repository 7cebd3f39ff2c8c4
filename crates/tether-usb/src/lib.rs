//! Tether USB - libusb and FTDI transports
//!
//! Both backends share one [`UsbContext`]. FTDI devices (vendor `0x0403`)
//! belong to the FTDI backend and are skipped by the generic libusb one.

pub mod context;
pub mod device;
pub mod error;
pub mod ftdi;
pub mod libusb;

pub use context::UsbContext;
pub use device::format_port_path;
pub use error::{error_code, error_name};
pub use ftdi::{FtdiCommunication, FtdiConfiguration, FTDI_VENDOR_ID};
pub use libusb::{LibUsbCommunication, UsbConfiguration};
