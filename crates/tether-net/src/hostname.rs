//! Reverse hostname lookup

use std::process::Command;
use tether_core::IpAddress;
use tracing::trace;

/// Reverse-resolve `ip`, falling back to its numeric form
pub fn reverse_lookup(ip: &IpAddress) -> String {
    lookup(ip).unwrap_or_else(|| ip.to_string())
}

#[cfg(target_os = "linux")]
fn lookup(ip: &IpAddress) -> Option<String> {
    let output = Command::new("getent").args(["hosts", &ip.to_string()]).output().ok()?;
    if !output.status.success() {
        trace!(ip = %ip, "No reverse DNS entry");
        return None;
    }
    parse_getent_output(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(target_os = "linux"))]
fn lookup(ip: &IpAddress) -> Option<String> {
    let output = Command::new("nslookup").arg(ip.to_string()).output().ok()?;
    if !output.status.success() {
        trace!(ip = %ip, "No reverse DNS entry");
        return None;
    }
    parse_nslookup_output(&String::from_utf8_lossy(&output.stdout))
}

/// `getent hosts` prints "<address> <canonical name> [aliases...]"
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_getent_output(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(|name| name.to_string())
}

/// Unix nslookup prints "... name = host.example.", Windows prints "Name:    host.example"
#[cfg_attr(target_os = "linux", allow(dead_code))]
fn parse_nslookup_output(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let line = line.trim();
        let name = if let Some(idx) = line.find("name = ") {
            &line[idx + "name = ".len()..]
        } else {
            line.strip_prefix("Name:")?
        };
        let name = name.trim().trim_end_matches('.');
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_getent_output() {
        let output = "192.168.1.5     plc-01.lab plc-01\n";
        assert_eq!(parse_getent_output(output), Some("plc-01.lab".to_string()));
        assert_eq!(parse_getent_output(""), None);
    }

    #[test]
    fn test_parse_nslookup_unix() {
        let output = "5.1.168.192.in-addr.arpa\tname = plc-01.lab.\n\nAuthoritative answers can be found from:\n";
        assert_eq!(parse_nslookup_output(output), Some("plc-01.lab".to_string()));
    }

    #[test]
    fn test_parse_nslookup_windows() {
        let output = "Server:  router.lan\nAddress:  192.168.1.1\n\nName:    plc-01.lab\nAddress:  192.168.1.5\n";
        assert_eq!(parse_nslookup_output(output), Some("plc-01.lab".to_string()));
    }

    #[test]
    fn test_parse_nslookup_not_found() {
        let output = "** server can't find 5.1.168.192.in-addr.arpa: NXDOMAIN\n";
        assert_eq!(parse_nslookup_output(output), None);
    }
}
