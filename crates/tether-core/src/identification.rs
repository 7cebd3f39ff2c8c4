//! Identification criteria supplied by callers and identities produced by discovery

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::IpAddress;
use crate::mac::MacAddress;

/// Glob accepted by every text field as "match anything"
pub const WILDCARD: &str = "*";

/// Sentinel for numeric IDs meaning "match anything"
pub const ANY_ID: u16 = 0x0000;

/// Transport-layer protocol for Ethernet devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EthernetProtocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for EthernetProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

fn wildcard() -> String {
    WILDCARD.to_string()
}

/// USB search criteria. Every field defaults to its wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbIdentification {
    /// Vendor ID, `0x0000` for any
    pub vendor_id: u16,
    /// Product ID, `0x0000` for any
    pub product_id: u16,
    /// Serial number glob
    pub serial_number: String,
    /// Port path glob (colon-joined hub port numbers)
    pub port: String,
}

impl UsbIdentification {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            ..Default::default()
        }
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = serial_number.into();
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }
}

/// Ethernet (and HTTP-over-Ethernet) search criteria
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthernetIdentification {
    /// Hostname glob
    pub name: String,
    /// IP glob; `*` or `0.0.0.0` scans every reachable subnet
    pub ip: String,
    /// MAC glob, matched against the uppercase colon form
    pub mac: String,
    /// Port to probe. `0` matches any port but cannot be probed.
    pub port: u16,
    pub protocol: EthernetProtocol,
}

impl Default for EthernetIdentification {
    fn default() -> Self {
        Self {
            name: String::new(),
            ip: wildcard(),
            mac: wildcard(),
            port: 0,
            protocol: EthernetProtocol::Tcp,
        }
    }
}

impl EthernetIdentification {
    /// Criteria scanning every reachable subnet on `port`
    pub fn scan(port: u16, protocol: EthernetProtocol) -> Self {
        Self {
            port,
            protocol,
            ..Default::default()
        }
    }

    /// Criteria for one concrete host
    pub fn host(ip: impl Into<String>, port: u16, protocol: EthernetProtocol) -> Self {
        Self {
            ip: ip.into(),
            port,
            protocol,
            ..Default::default()
        }
    }

    /// Whether the IP field selects more than one host
    pub fn is_subnet_scan(&self) -> bool {
        let ip = self.ip.trim();
        ip.is_empty() || ip == WILDCARD || ip == "0.0.0.0" || ip.contains(['*', '?'])
    }
}

/// Criteria for one transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum DeviceIdentification {
    Usb(UsbIdentification),
    Ethernet(EthernetIdentification),
    Http(EthernetIdentification),
}

impl From<UsbIdentification> for DeviceIdentification {
    fn from(criteria: UsbIdentification) -> Self {
        Self::Usb(criteria)
    }
}

impl From<EthernetIdentification> for DeviceIdentification {
    fn from(criteria: EthernetIdentification) -> Self {
        Self::Ethernet(criteria)
    }
}

/// Identity of a USB device found on the bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbDeviceInfo {
    /// Product string
    pub name: String,
    pub manufacturer: String,
    pub serial_number: String,
    /// Colon-joined hub port numbers, e.g. `1:4:2`
    pub port: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl fmt::Display for UsbDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} {} {} (port {}, serial {})",
            self.vendor_id,
            self.product_id,
            self.manufacturer,
            self.name,
            self.port,
            self.serial_number
        )
    }
}

/// Identity of a reachable Ethernet host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EthernetDeviceInfo {
    /// Reverse-DNS name, or the numeric address when unresolved
    pub hostname: String,
    pub ip: IpAddress,
    pub mac: MacAddress,
    pub port: u16,
    pub protocol: EthernetProtocol,
}

impl fmt::Display for EthernetDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} ({}) [{}]",
            self.hostname, self.ip, self.port, self.protocol, self.mac
        )
    }
}

/// Discovered identity for any transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum DeviceInfo {
    Usb(UsbDeviceInfo),
    Ethernet(EthernetDeviceInfo),
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb(info) => info.fmt(f),
            Self::Ethernet(info) => info.fmt(f),
        }
    }
}
