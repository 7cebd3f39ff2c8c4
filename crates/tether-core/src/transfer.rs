//! Transfer configurations, endpoint descriptions and transport kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method used by an HTTP-shaped transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{}", verb)
    }
}

/// Shape of a single read or write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransferConfiguration {
    Bulk {
        endpoint: u8,
    },
    Control {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
    },
    Interrupt {
        endpoint: u8,
    },
    Http {
        verb: HttpVerb,
        path: String,
    },
    /// Raw byte stream over an Ethernet socket
    Stream,
}

impl TransferConfiguration {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bulk { .. } => "bulk",
            Self::Control { .. } => "control",
            Self::Interrupt { .. } => "interrupt",
            Self::Http { .. } => "http",
            Self::Stream => "stream",
        }
    }

    pub fn http(verb: HttpVerb, path: impl Into<String>) -> Self {
        Self::Http {
            verb,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointDirection {
    #[default]
    Unknown,
    In,
    Out,
    Duplex,
}

/// One endpoint exposed by an open device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub direction: EndpointDirection,
    /// USB endpoint number, or the port for network transports
    pub address: u16,
}

impl EndpointInfo {
    pub fn new(direction: EndpointDirection, address: u16) -> Self {
        Self { direction, address }
    }
}

/// Backend carrying a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[serde(rename = "libusb")]
    LibUsb,
    Ftdi,
    Ethernet,
    Http,
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LibUsb => "libusb",
            Self::Ftdi => "ftdi",
            Self::Ethernet => "ethernet",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_names() {
        assert_eq!(TransportKind::LibUsb.to_string(), "libusb");
        assert_eq!(TransportKind::Ftdi.to_string(), "ftdi");
        assert_eq!(
            serde_json::to_string(&TransportKind::LibUsb).unwrap(),
            "\"libusb\""
        );
    }

    #[test]
    fn test_transfer_configuration_serde() {
        let transfer: TransferConfiguration =
            serde_json::from_str(r#"{"kind": "http", "verb": "GET", "path": "/status"}"#).unwrap();
        assert_eq!(transfer, TransferConfiguration::http(HttpVerb::Get, "/status"));
        assert_eq!(transfer.kind_name(), "http");

        let transfer: TransferConfiguration =
            serde_json::from_str(r#"{"kind": "bulk", "endpoint": 1}"#).unwrap();
        assert_eq!(transfer, TransferConfiguration::Bulk { endpoint: 1 });
    }
}
