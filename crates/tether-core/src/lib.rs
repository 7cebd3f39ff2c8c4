//! Tether Core - Address arithmetic, identification and the transport contract
//!
//! This crate holds the transport-independent pieces of Tether:
//! - IPv4/IPv6 and MAC address values with subnet arithmetic
//! - Network topology derived from an interface address
//! - Identification criteria, discovered identities and glob matching
//! - Transfer configurations and the `Transport` trait every backend implements

pub mod address;
pub mod error;
pub mod identification;
pub mod mac;
pub mod matcher;
pub mod topology;
pub mod transfer;
pub mod transport;

pub use address::{AddressError, AddressFamily, IpAddress};
pub use error::{CommunicationError, Result};
pub use identification::{
    DeviceIdentification, DeviceInfo, EthernetDeviceInfo, EthernetIdentification,
    EthernetProtocol, UsbDeviceInfo, UsbIdentification, ANY_ID, WILDCARD,
};
pub use mac::MacAddress;
pub use matcher::{glob_match, Matches};
pub use topology::NetworkTopology;
pub use transfer::{EndpointDirection, EndpointInfo, HttpVerb, TransferConfiguration, TransportKind};
pub use transport::{NativeHandle, Transport};
