//! IPv4 networks and reverse DNS naming

use std::fmt;
use std::net::Ipv4Addr;

/// An IPv4 network: base address plus prefix length, host bits always zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Net {
    base: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Net {
    /// Build a network from any address inside it; host bits are masked off
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Option<Self> {
        if prefix > 32 {
            return None;
        }
        let base = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Some(Self { base, prefix })
    }

    /// Parse `a.b.c.d/len`, `a.b.c.d/m.m.m.m` or a bare address (a /32)
    pub fn parse(literal: &str) -> Result<Self, String> {
        let literal = literal.trim();
        let (addr, prefix) = match literal.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (literal, None),
        };

        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("invalid IPv4 address in '{}'", literal))?;

        let prefix = match prefix {
            None => 32,
            Some(p) if p.contains('.') => {
                let netmask: Ipv4Addr = p
                    .parse()
                    .map_err(|_| format!("invalid netmask in '{}'", literal))?;
                prefix_from_netmask(netmask)
                    .ok_or_else(|| format!("non-contiguous netmask in '{}'", literal))?
            }
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= 32)
                .ok_or_else(|| format!("invalid prefix length in '{}'", literal))?,
        };

        Self::new(addr, prefix).ok_or_else(|| format!("invalid network '{}'", literal))
    }

    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) | !mask(self.prefix))
    }

    pub fn is_host(&self) -> bool {
        self.prefix == 32
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.base)
    }

    /// Number of trailing octets touched by host bits
    pub fn host_octets(&self) -> usize {
        (32 - self.prefix as usize).div_ceil(8)
    }

    /// Name of the reverse zone owning this network, e.g. `0.0.10.in-addr.arpa`
    pub fn reverse_zone(&self) -> String {
        let octets = self.base.octets();
        let mut labels: Vec<String> = octets[..4 - self.host_octets()]
            .iter()
            .rev()
            .map(|o| o.to_string())
            .collect();
        labels.push("in-addr.arpa".to_string());
        labels.join(".")
    }

    /// Owner label of `addr` inside [`reverse_zone`](Self::reverse_zone)
    pub fn reverse_label(&self, addr: Ipv4Addr) -> String {
        let octets = addr.octets();
        octets[4 - self.host_octets()..]
            .iter()
            .rev()
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

fn prefix_from_netmask(netmask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(netmask);
    let prefix = bits.leading_ones();
    if bits.checked_shl(prefix).unwrap_or(0) == 0 {
        Some(prefix as u8)
    } else {
        None
    }
}
