//! Resolved network model
//!
//! Everything the renderers and the state dumper need, with every default
//! applied, every key present and every address allocated. Built once by
//! [`ModelBuilder`] and read-only afterwards.

pub mod alloc;
pub mod builder;
pub mod check;
pub mod net;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::Serialize;

use crate::crypto::KeyPair;

pub use alloc::AddressAllocator;
pub use builder::ModelBuilder;
pub use check::{check, ConsistencyPolicy};
pub use net::Ipv4Net;

/// MTU ceiling for relays reached over plain UDP
pub const DIRECT_MTU_MAX: u16 = 1460;

/// MTU ceiling for relays behind udp2raw; faketcp headers eat the difference
pub const OBFUSCATED_MTU_MAX: u16 = 1340;

/// Smallest MTU accepted for any relay
pub const MTU_MIN: u16 = 576;

/// Longest Linux interface name
pub const INTERFACE_NAME_MAX: usize = 15;

/// Longest DNS label
pub const DNS_LABEL_MAX: usize = 63;

/// How a relay is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transport {
    /// Plain WireGuard over UDP
    #[serde(rename = "udp")]
    Direct,
    /// WireGuard wrapped in udp2raw faketcp
    #[serde(rename = "tcp")]
    Obfuscated,
}

impl Transport {
    /// Parse a `proto` value; `udp`/`direct` and `tcp`/`obfuscated`, any case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "udp" | "direct" => Some(Transport::Direct),
            "tcp" | "obfuscated" => Some(Transport::Obfuscated),
            _ => None,
        }
    }

    pub fn mtu_max(&self) -> u16 {
        match self {
            Transport::Direct => DIRECT_MTU_MAX,
            Transport::Obfuscated => OBFUSCATED_MTU_MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Direct => "udp",
            Transport::Obfuscated => "tcp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// udp2raw settings of a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obfuscation {
    pub port: u16,
    pub secret: String,
}

/// BIND settings of a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    /// Host label of the name server inside the relay's zone
    pub hostname: String,
    /// BIND configuration directory on the relay
    pub conf_dir: PathBuf,
    /// Reverse zone covering the relay network
    pub reverse_zone: String,
    /// Reverse record label of the relay address
    pub reverse_label: String,
}

/// Android-specific launch settings of a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedPlatform {
    pub wgquick_path: PathBuf,
    /// Only set when the peer runs udp2raw itself
    pub udp2raw_path: Option<PathBuf>,
}

/// A peer connecting through a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub keys: KeyPair,
    pub address: Ipv4Addr,
    /// Requested udp2raw transport
    pub obfuscated: bool,
    /// udp2raw log file, set when the peer actually runs udp2raw
    pub obfuscation_log: Option<PathBuf>,
    /// BIND root hint file, set when the peer forwards its root zone
    pub root_zone_file: Option<PathBuf>,
    pub restricted: Option<RestrictedPlatform>,
    pub wg_handled_dns: bool,
    pub append_extra: bool,
    pub extra_allowed: Vec<Ipv4Net>,
    /// Reverse record label, set when the relay serves DNS
    pub reverse_label: Option<String>,
}

impl Peer {
    pub fn uses_dns_zone(&self) -> bool {
        self.root_zone_file.is_some()
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted.is_some()
    }

    /// Whether this peer reaches `relay` through udp2raw
    pub fn runs_udp2raw(&self, relay: &Relay) -> bool {
        self.obfuscated && relay.is_obfuscated()
    }
}

/// A relay and its peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub name: String,
    pub transport: Transport,
    pub keys: KeyPair,
    pub endpoint: IpAddr,
    pub port: u16,
    pub network: Ipv4Net,
    /// The relay's own tunnel address
    pub address: Ipv4Addr,
    pub mtu: u16,
    pub obfuscation: Option<Obfuscation>,
    pub dns: Option<DnsSettings>,
    pub extra_addresses: Vec<Ipv4Addr>,
    pub extra_allowed: Vec<Ipv4Net>,
    /// Extra networks of all peers, deduplicated, in declaration order
    pub peer_networks: Vec<Ipv4Net>,
    pub peers: Vec<Peer>,
}

impl Relay {
    pub fn is_obfuscated(&self) -> bool {
        self.transport == Transport::Obfuscated
    }

    pub fn serves_dns(&self) -> bool {
        self.dns.is_some()
    }

    /// Routes a peer should send through this relay
    ///
    /// Always the relay network; with `append_extra` also the relay's extra
    /// addresses and networks and every other peer's extra networks.
    pub fn routes_for(&self, peer: &Peer) -> Vec<Ipv4Net> {
        let mut routes = vec![self.network];
        if !peer.append_extra {
            return routes;
        }

        let extras = self
            .extra_addresses
            .iter()
            .filter_map(|addr| Ipv4Net::new(*addr, 32))
            .chain(self.extra_allowed.iter().copied())
            .chain(
                self.peer_networks
                    .iter()
                    .copied()
                    .filter(|net| !peer.extra_allowed.contains(net)),
            );
        for net in extras {
            if !routes.contains(&net) {
                routes.push(net);
            }
        }
        routes
    }
}

/// The whole resolved network
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkModel {
    pub relays: Vec<Relay>,
}

impl NetworkModel {
    pub fn peer_count(&self) -> usize {
        self.relays.iter().map(|r| r.peers.len()).sum()
    }

    pub fn serves_dns(&self) -> bool {
        self.relays.iter().any(Relay::serves_dns)
    }
}

/// Interface-style name: 1-15 chars of `[A-Za-z0-9_=+.-]`
pub fn is_interface_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= INTERFACE_NAME_MAX && name.chars().all(is_file_safe_char)
}

/// Name usable as a file name component: 1+ chars of `[A-Za-z0-9_=+.-]`
pub fn is_file_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && name.chars().all(is_file_safe_char)
}

/// DNS label: letters, digits and inner hyphens, at most 63 chars
pub fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= DNS_LABEL_MAX
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_file_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '+' | '.' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_parse() {
        assert_eq!(Transport::parse("UDP"), Some(Transport::Direct));
        assert_eq!(Transport::parse("direct"), Some(Transport::Direct));
        assert_eq!(Transport::parse(" tcp "), Some(Transport::Obfuscated));
        assert_eq!(Transport::parse("obfuscated"), Some(Transport::Obfuscated));
        assert_eq!(Transport::parse("quic"), None);
        assert_eq!(Transport::Obfuscated.mtu_max(), 1340);
        assert_eq!(Transport::Direct.mtu_max(), 1460);
    }

    #[test]
    fn test_names() {
        assert!(is_interface_name("wg-home.0"));
        assert!(is_interface_name("abcdefghijklmno"));
        assert!(!is_interface_name("abcdefghijklmnop"));
        assert!(!is_interface_name("wg 0"));
        assert!(!is_interface_name("wg/0"));
        assert!(!is_interface_name(""));

        assert!(is_dns_label("laptop-1"));
        assert!(!is_dns_label("-laptop"));
        assert!(!is_dns_label("lap_top"));
        assert!(!is_dns_label("lap.top"));
        assert!(!is_dns_label(&"a".repeat(64)));

        assert!(is_file_safe_name("phone_2"));
        assert!(!is_file_safe_name(".."));
        assert!(!is_file_safe_name("a/b"));
    }
}
