//! Parsing of the kernel neighbor table (`ip neigh show` output).
//!
//! The polling commands themselves are an external concern; everything
//! here turns their output into `(MacAddress, IpAddr)` observations.

use std::io;
use std::net::IpAddr;
use std::process::Command;

use tollgate_core::MacAddress;
use tracing::warn;

/// Neighbor entries in these states count as present.
const VALID_STATES: [&str; 3] = ["REACHABLE", "DELAY", "STALE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// Parses one `ip neigh` line, e.g.
/// `10.0.0.7 dev eth0 lladdr aa:bb:cc:dd:ee:ff STALE`.
/// Lines in other states, or that do not parse, yield None.
pub fn parse_neigh_line(line: &str) -> Option<(MacAddress, IpAddr)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let state = *tokens.last()?;
    if !VALID_STATES.contains(&state) {
        return None;
    }
    let ip: IpAddr = tokens.first()?.parse().ok()?;
    let lladdr = tokens.iter().position(|t| *t == "lladdr")?;
    let mac: MacAddress = tokens.get(lladdr + 1)?.parse().ok()?;
    Some((mac, ip))
}

/// Snapshot of current neighbors for one address family on one device.
pub fn current_neighbors(family: IpFamily, device: &str) -> io::Result<Vec<(MacAddress, IpAddr)>> {
    let family_arg = match family {
        IpFamily::V4 => "-4",
        IpFamily::V6 => "-6",
    };
    let output = Command::new("/bin/ip")
        .args([family_arg, "neigh", "show", "dev", device])
        .output()?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(parse_neigh_line)
        .collect())
}

/// Looks up the MAC currently associated with one address.
pub fn mac_for_addr(addr: IpAddr) -> io::Result<Option<MacAddress>> {
    let output = Command::new("/bin/ip")
        .args(["neigh", "show", &addr.to_string()])
        .output()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() > 1 {
        warn!("more than one neighbor entry for {}", addr);
    }
    Ok(lines
        .first()
        .and_then(|line| parse_neigh_line(line))
        .map(|(mac, _)| mac))
}

/// Resolves a peer address to its MAC. The redirector depends on this seam
/// rather than on the neighbor table directly, so tests can substitute a
/// fixed mapping.
pub trait NeighborResolver: Send + Sync {
    fn mac_for(&self, addr: IpAddr) -> Option<MacAddress>;
}

/// Production resolver backed by the kernel neighbor table.
pub struct SystemNeighbors;

impl NeighborResolver for SystemNeighbors {
    fn mac_for(&self, addr: IpAddr) -> Option<MacAddress> {
        match mac_for_addr(addr) {
            Ok(mac) => mac,
            Err(e) => {
                warn!("neighbor lookup for {} failed: {}", addr, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reachable_ipv4_entry() {
        let (mac, ip) =
            parse_neigh_line("10.0.0.7 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE").unwrap();
        assert_eq!(mac, "aa:bb:cc:dd:ee:ff".parse().unwrap());
        assert_eq!(ip, "10.0.0.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn parses_stale_ipv6_entry() {
        let (mac, ip) =
            parse_neigh_line("fe80::1 dev eth0 lladdr 00:11:22:33:44:55 router STALE").unwrap();
        assert_eq!(mac, "00:11:22:33:44:55".parse().unwrap());
        assert_eq!(ip, "fe80::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn skips_failed_and_incomplete_entries() {
        assert!(parse_neigh_line("10.0.0.9 dev eth0 FAILED").is_none());
        assert!(parse_neigh_line("10.0.0.9 dev eth0 INCOMPLETE").is_none());
        assert!(parse_neigh_line("10.0.0.9 dev eth0 nud PERMANENT").is_none());
    }

    #[test]
    fn skips_garbage() {
        assert!(parse_neigh_line("").is_none());
        assert!(parse_neigh_line("not an address dev eth0 lladdr zz REACHABLE").is_none());
        assert!(parse_neigh_line("10.0.0.9 dev eth0 lladdr REACHABLE").is_none());
    }
}
