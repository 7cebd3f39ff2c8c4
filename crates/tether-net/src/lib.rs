//! Tether Net - Ethernet discovery and network transports
//!
//! This crate provides:
//! - Local interface enumeration with per-interface subnet topology
//! - Neighbor table and reverse-DNS lookups for peer identity
//! - A TCP/UDP socket primitive that resolves peer hostname and MAC on connect
//! - Bounded-concurrency subnet scanning
//! - Raw socket and HTTP transports implementing `tether_core::Transport`

pub mod arp;
pub mod ethernet;
pub mod hostname;
pub mod http;
pub mod interface;
pub mod probe;
pub mod resolver;
pub mod scanner;
pub mod socket;

pub use ethernet::{EthernetCommunication, EthernetConfiguration};
pub use http::{HttpCommunication, HttpConfiguration, DEFAULT_HTTP_PORT};
pub use interface::{list_interfaces, Interface};
pub use probe::{HostProbe, SocketProbe, PROBE_TIMEOUT_MS};
pub use resolver::{NeighborResolver, SystemResolver};
pub use scanner::{dedupe, EthernetScanner, ScannerConfig, MAX_CONCURRENT_PROBES};
pub use socket::{EthernetSocket, SocketState};
