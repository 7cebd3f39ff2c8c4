//! Tether - one device handle over USB, Ethernet and HTTP
//!
//! Describe the devices you are looking for with [`DeviceIdentification`]
//! criteria, hand them to a [`DeviceManager`], and open whichever
//! [`DeviceCommunication`] comes back without caring which transport
//! carries the bytes.
//!
//! ```no_run
//! use tether::{
//!     DeviceIdentification, DeviceManager, EthernetIdentification, EthernetProtocol,
//!     TransferConfiguration,
//! };
//!
//! let manager = DeviceManager::new();
//! let criteria = vec![DeviceIdentification::from(EthernetIdentification::scan(
//!     502,
//!     EthernetProtocol::Tcp,
//! ))];
//! for mut device in manager.get_devices(&criteria)? {
//!     device.open()?;
//!     device.write(&TransferConfiguration::Stream, b"ping")?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod context;
pub mod device;
pub mod error;
pub mod logging;
pub mod manager;
pub mod session;
pub mod settings;

pub use context::EthernetContext;
pub use device::{Configuration, DeviceCommunication};
pub use error::DiscoveryError;
pub use logging::{LogCallback, LogFormat, LogLevel, LogRecord, LoggingError};
pub use manager::{DeviceManager, DeviceManagerBuilder};
pub use session::{DiscoverySession, DiscoveryStatus};
pub use settings::{DiscoverySettings, LoggingSettings, Settings, SettingsError};

pub use tether_core::{
    CommunicationError, DeviceIdentification, DeviceInfo, EndpointDirection, EndpointInfo,
    EthernetDeviceInfo, EthernetIdentification, EthernetProtocol, HttpVerb, IpAddress,
    MacAddress, NativeHandle, NetworkTopology, TransferConfiguration, TransportKind,
    UsbDeviceInfo, UsbIdentification,
};
pub use tether_net::{
    list_interfaces, EthernetConfiguration, HttpConfiguration, Interface, NeighborResolver,
    ScannerConfig,
};
pub use tether_usb::{FtdiConfiguration, UsbConfiguration};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library version as `major.minor.patch`
pub fn version() -> &'static str {
    VERSION
}
