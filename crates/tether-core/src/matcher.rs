//! Matching discovered identities against caller criteria
//!
//! Numeric fields match when the criterion is `0` or equal. Text fields match
//! when the criterion is empty, `*`, or an anchored case-sensitive glob that
//! matches the whole discovered string.

use crate::address::IpAddress;
use crate::identification::{
    DeviceIdentification, DeviceInfo, EthernetDeviceInfo, EthernetIdentification,
    UsbDeviceInfo, UsbIdentification, ANY_ID, WILDCARD,
};

/// Anchored glob match supporting `*` (any run, possibly empty) and `?`
/// (exactly one character).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it is currently absorbing up to
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(&c) if c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

fn text_matches(criterion: &str, value: &str) -> bool {
    criterion.is_empty() || criterion == WILDCARD || glob_match(criterion, value)
}

fn id_matches(criterion: u16, value: u16) -> bool {
    criterion == ANY_ID || criterion == value
}

/// Criteria that can be tested against a discovered identity
pub trait Matches<T> {
    fn matches(&self, identity: &T) -> bool;
}

impl Matches<UsbDeviceInfo> for UsbIdentification {
    fn matches(&self, device: &UsbDeviceInfo) -> bool {
        id_matches(self.vendor_id, device.vendor_id)
            && id_matches(self.product_id, device.product_id)
            && text_matches(&self.serial_number, &device.serial_number)
            && text_matches(&self.port, &device.port)
    }
}

/// Concrete addresses compare by value so spacing and IPv6 spelling don't
/// matter; anything else is a glob over the canonical text.
fn ip_matches(criterion: &str, value: &IpAddress) -> bool {
    let criterion = criterion.trim();
    if criterion == "0.0.0.0" {
        return true;
    }
    match criterion.parse::<IpAddress>() {
        Ok(address) => address == *value,
        Err(_) => text_matches(criterion, &value.to_string()),
    }
}

impl Matches<EthernetDeviceInfo> for EthernetIdentification {
    fn matches(&self, device: &EthernetDeviceInfo) -> bool {
        text_matches(&self.name, &device.hostname)
            && ip_matches(&self.ip, &device.ip)
            && text_matches(&self.mac, &device.mac.to_string())
            && id_matches(self.port, device.port)
            && self.protocol == device.protocol
    }
}

impl Matches<DeviceInfo> for DeviceIdentification {
    fn matches(&self, device: &DeviceInfo) -> bool {
        match (self, device) {
            (Self::Usb(criteria), DeviceInfo::Usb(info)) => criteria.matches(info),
            (Self::Ethernet(criteria), DeviceInfo::Ethernet(info))
            | (Self::Http(criteria), DeviceInfo::Ethernet(info)) => criteria.matches(info),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::EthernetProtocol;
    use crate::mac::MacAddress;

    fn usb_device() -> UsbDeviceInfo {
        UsbDeviceInfo {
            name: "STM32 Virtual ComPort".to_string(),
            manufacturer: "STMicroelectronics".to_string(),
            serial_number: "205F31A54E42".to_string(),
            port: "1:4:2".to_string(),
            vendor_id: 0x0483,
            product_id: 0x5740,
        }
    }

    fn eth_device() -> EthernetDeviceInfo {
        EthernetDeviceInfo {
            hostname: "plc-01.lab".to_string(),
            ip: "10.0.5.1".parse().unwrap(),
            mac: MacAddress([0x00, 0x1b, 0x44, 0x11, 0x3a, 0xb7]),
            port: 502,
            protocol: EthernetProtocol::Tcp,
        }
    }

    #[test]
    fn test_glob_vectors() {
        assert!(glob_match("10.0.*.1", "10.0.5.1"));
        assert!(!glob_match("10.0.*.1", "10.1.5.1"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*", ""));
        assert!(glob_match("A?C", "ABC"));
        assert!(!glob_match("A?C", "ABBC"));
        assert!(!glob_match("A?C", "AC"));
    }

    #[test]
    fn test_glob_is_anchored() {
        assert!(!glob_match("abc", "xabcx"));
        assert!(!glob_match("abc", "abcd"));
        assert!(glob_match("abc", "abc"));
        assert!(glob_match("", ""));
        assert!(!glob_match("", "a"));
    }

    #[test]
    fn test_glob_backtracking() {
        assert!(glob_match("*abc", "ababc"));
        assert!(glob_match("a*b*c", "aXbYbZc"));
        assert!(glob_match("*.*.*.1", "192.168.10.1"));
        assert!(!glob_match("*.*.*.1", "192.168.10.11"));
        assert!(glob_match("a**b", "ab"));
        assert!(!glob_match("a*b", "aXbY"));
    }

    #[test]
    fn test_glob_case_sensitive() {
        assert!(!glob_match("abc", "ABC"));
        assert!(glob_match("AA:BB:*", "AA:BB:CC:DD:EE:FF"));
        assert!(!glob_match("aa:bb:*", "AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_usb_wildcards_match_anything() {
        assert!(UsbIdentification::default().matches(&usb_device()));
    }

    #[test]
    fn test_usb_exact_ids() {
        let device = usb_device();
        assert!(UsbIdentification::new(0x0483, 0x5740).matches(&device));
        assert!(UsbIdentification::new(0x0483, 0).matches(&device));
        assert!(!UsbIdentification::new(0x0483, 0x5741).matches(&device));
        assert!(!UsbIdentification::new(0x1209, 0).matches(&device));
    }

    #[test]
    fn test_usb_text_fields() {
        let device = usb_device();
        assert!(UsbIdentification::default().with_serial_number("205F*").matches(&device));
        assert!(!UsbIdentification::default().with_serial_number("205F").matches(&device));
        assert!(UsbIdentification::default().with_port("1:4:?").matches(&device));
        assert!(!UsbIdentification::default().with_port("1:3:*").matches(&device));
    }

    #[test]
    fn test_ethernet_fields() {
        let device = eth_device();
        assert!(EthernetIdentification::scan(502, EthernetProtocol::Tcp).matches(&device));
        assert!(EthernetIdentification::host("0.0.0.0", 502, EthernetProtocol::Tcp).matches(&device));
        assert!(EthernetIdentification::host("10.0.*.1", 502, EthernetProtocol::Tcp).matches(&device));
        assert!(!EthernetIdentification::host("10.1.*.1", 502, EthernetProtocol::Tcp).matches(&device));
        assert!(!EthernetIdentification::scan(503, EthernetProtocol::Tcp).matches(&device));
        assert!(!EthernetIdentification::scan(502, EthernetProtocol::Udp).matches(&device));
        assert!(EthernetIdentification::scan(0, EthernetProtocol::Tcp).matches(&device));
    }

    #[test]
    fn test_ethernet_concrete_ip_compares_by_value() {
        let device = eth_device();
        assert!(EthernetIdentification::host(" 10.0.5.1 ", 502, EthernetProtocol::Tcp).matches(&device));
        assert!(!EthernetIdentification::host("10.0.5.10", 502, EthernetProtocol::Tcp).matches(&device));

        let mut v6 = eth_device();
        v6.ip = "fe80::1".parse().unwrap();
        assert!(EthernetIdentification::host("FE80::1", 502, EthernetProtocol::Tcp).matches(&v6));
        assert!(EthernetIdentification::host("fe80:0:0:0:0:0:0:1", 502, EthernetProtocol::Tcp).matches(&v6));
        assert!(EthernetIdentification::host("fe80::*", 502, EthernetProtocol::Tcp).matches(&v6));
    }

    #[test]
    fn test_ethernet_name_and_mac() {
        let device = eth_device();
        let mut criteria = EthernetIdentification::scan(502, EthernetProtocol::Tcp);
        criteria.name = "plc-*".to_string();
        criteria.mac = "00:1B:44:*".to_string();
        assert!(criteria.matches(&device));

        criteria.mac = "00:1b:44:*".to_string();
        assert!(!criteria.matches(&device));
    }

    #[test]
    fn test_transport_mismatch() {
        let criteria = DeviceIdentification::Usb(UsbIdentification::default());
        assert!(!criteria.matches(&DeviceInfo::Ethernet(eth_device())));
        assert!(criteria.matches(&DeviceInfo::Usb(usb_device())));

        let criteria = DeviceIdentification::Http(EthernetIdentification::scan(502, EthernetProtocol::Tcp));
        assert!(criteria.matches(&DeviceInfo::Ethernet(eth_device())));
    }
}
