//! Provides functions to parse the target network and walk its addresses.
mod cycle;

pub use cycle::AddressCycle;

use std::net::Ipv4Addr;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use cidr_utils::cidr::{Ipv4Cidr, Ipv4Inet};
use log::debug;
use rand::Rng;

use crate::input::ScanOrder;

/// Parses the target network in CIDR notation.
///
/// Host bits are allowed and masked off, so `10.0.0.7/30` is the same
/// network as `10.0.0.4/30`. A bare address is a `/32`.
///
/// ```rust
/// # use mgrhunt::address::parse_network;
/// let network = parse_network("192.168.0.0/30").unwrap();
/// assert_eq!(network.network_length(), 30);
/// ```
pub fn parse_network(input: &str) -> Result<Ipv4Cidr> {
    let inet = Ipv4Inet::from_str(input.trim()).with_context(|| {
        format!("Either the target is missing or its format is wrong: {input:?}. Try e.g. --target 10.0.0.0/8")
    })?;
    Ok(inet.network())
}

/// Number of addresses covered by `network`, between 1 and 2^32.
pub fn address_count(network: &Ipv4Cidr) -> u64 {
    1u64 << (32 - u32::from(network.network_length()))
}

/// Order in which offsets of the network are handed out.
#[derive(Debug)]
enum Walk {
    Random(AddressCycle),
    Serial(Range<u64>),
}

impl Iterator for Walk {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        match self {
            Self::Random(cycle) => cycle.next(),
            Self::Serial(range) => range.next(),
        }
    }
}

/// Hands out every address of a network exactly once, in random or
/// ascending order, to any number of concurrent callers.
#[derive(Debug)]
pub struct NetworkIterator {
    base: Ipv4Addr,
    size: u64,
    walk: Mutex<Walk>,
}

impl NetworkIterator {
    pub fn new(network: &Ipv4Cidr) -> Self {
        Self::with_order(network, ScanOrder::Random)
    }

    pub fn with_order(network: &Ipv4Cidr, order: ScanOrder) -> Self {
        let size = address_count(network);
        let walk = match order {
            ScanOrder::Random => Walk::Random(AddressCycle::new(size)),
            ScanOrder::Serial => Walk::Serial(0..size),
        };
        Self::with_walk(network, size, walk)
    }

    /// Like [`NetworkIterator::new`], but seeds the address order from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(network: &Ipv4Cidr, rng: &mut R) -> Self {
        let size = address_count(network);
        Self::with_walk(network, size, Walk::Random(AddressCycle::with_rng(size, rng)))
    }

    fn with_walk(network: &Ipv4Cidr, size: u64, walk: Walk) -> Self {
        debug!(
            "Walking {size} addresses of {network} in {} order",
            if matches!(walk, Walk::Serial(_)) { "ascending" } else { "random" }
        );
        Self {
            base: network.first_address(),
            size,
            walk: Mutex::new(walk),
        }
    }

    /// Returns the next address, or `None` once the network is exhausted.
    pub fn next_address(&self) -> Option<Ipv4Addr> {
        let offset = {
            let mut walk = self.walk.lock().unwrap_or_else(|e| e.into_inner());
            walk.next()?
        };
        let host = u64::from(u32::from(self.base)) + offset;
        u32::try_from(host).ok().map(Ipv4Addr::from)
    }

    /// Total number of addresses this iterator yields.
    pub const fn len(&self) -> u64 {
        self.size
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}
