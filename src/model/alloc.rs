//! Per-relay tunnel address allocation
//!
//! The first host address of a relay's network belongs to the relay; peers
//! receive the following addresses in declaration order. Addresses are never
//! handed out twice and the broadcast address is never used.

use std::net::Ipv4Addr;

use crate::model::net::Ipv4Net;

/// Sequential allocator over one relay network
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    network: Ipv4Net,
    next: u64,
    last: u64,
}

impl AddressAllocator {
    /// Start allocating in `network`; `None` for a host-only network
    pub fn new(network: Ipv4Net) -> Option<Self> {
        if network.is_host() {
            return None;
        }
        let base = u64::from(u32::from(network.base()));
        let broadcast = u64::from(u32::from(network.broadcast()));
        // A /31 has no broadcast address, both halves are usable.
        let last = if network.prefix() == 31 { broadcast } else { broadcast - 1 };
        Some(Self {
            network,
            next: base + 2,
            last,
        })
    }

    /// Address reserved for the relay itself
    pub fn relay_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network.base()) + 1)
    }

    /// Next free peer address, `None` once the network is exhausted
    pub fn allocate(&mut self) -> Option<Ipv4Addr> {
        if self.next > self.last {
            return None;
        }
        let addr = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        Some(addr)
    }
}
