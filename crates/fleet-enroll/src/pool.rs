//! Managed address pool
//!
//! Exit node addresses come from one configured block. Allocation runs
//! inside the enrollment transaction, so the in-use set it checks
//! against is the same snapshot the node insert commits into.

use fleet_common::FleetError;
use ipnetwork::Ipv4Network;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Allocator over a configured IPv4 block.
#[derive(Debug, Clone, Copy)]
pub struct AddressPool {
    network: Ipv4Network,
}

impl AddressPool {
    pub fn new(network: Ipv4Network) -> Self {
        Self { network }
    }

    /// The platform default block for remote exit nodes.
    pub fn default_pool() -> Self {
        // Static CIDR, prefix is always valid.
        Self::new(Ipv4Network::new(Ipv4Addr::new(100, 89, 128, 0), 20).expect("valid pool CIDR"))
    }

    pub fn network(&self) -> Ipv4Network {
        self.network
    }

    /// Lowest host address not currently in use.
    pub fn allocate(&self, in_use: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr, FleetError> {
        self.network
            .iter()
            .skip(1) // network address
            .find(|addr| !in_use.contains(addr))
            .ok_or_else(|| FleetError::Internal("address pool exhausted".into()))
    }
}
