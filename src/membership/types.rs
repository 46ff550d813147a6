use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ClusterError;

/// Network identity of a node, in dotted-quad form.
///
/// Ordering compares the octets numerically left to right, so `10.0.0.9` sorts
/// before `10.0.0.10`. The same ordering breaks clock ties and lays out the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub Ipv4Addr);

impl Address {
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(Ipv4Addr::new(a, b, c, d))
    }
}

impl FromStr for Address {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Self)
            .map_err(|_| ClusterError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sorted, duplicate-free list of the addresses this node believes are in the
/// network. The owner's own address is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipView {
    local: Address,
    members: Vec<Address>,
}

impl MembershipView {
    pub fn new(local: Address) -> Self {
        Self {
            local,
            members: vec![local],
        }
    }

    pub fn local(&self) -> Address {
        self.local
    }

    pub fn members(&self) -> &[Address] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_solitary(&self) -> bool {
        self.members.len() == 1
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.members.binary_search(addr).is_ok()
    }

    /// Inserts `addr` at its sorted position. Returns `false` if it was already known.
    pub fn insert(&mut self, addr: Address) -> bool {
        match self.members.binary_search(&addr) {
            Ok(_) => false,
            Err(pos) => {
                self.members.insert(pos, addr);
                true
            }
        }
    }

    /// Removes `addr`. The local address is never removed.
    pub fn remove(&mut self, addr: &Address) -> bool {
        if *addr == self.local {
            return false;
        }
        match self.members.binary_search(addr) {
            Ok(pos) => {
                self.members.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Unions `addrs` into the view and returns the ones that were new, in
    /// the order they were given.
    pub fn merge<I>(&mut self, addrs: I) -> Vec<Address>
    where
        I: IntoIterator<Item = Address>,
    {
        addrs.into_iter().filter(|addr| self.insert(*addr)).collect()
    }

    /// Every member except the local node.
    pub fn peers(&self) -> Vec<Address> {
        self.members
            .iter()
            .filter(|addr| **addr != self.local)
            .copied()
            .collect()
    }

    /// The member after the local node in ring order, wrapping around.
    /// `None` when the node is alone.
    pub fn successor(&self) -> Option<Address> {
        if self.is_solitary() {
            return None;
        }
        let idx = self.members.binary_search(&self.local).ok()?;
        Some(self.members[(idx + 1) % self.members.len()])
    }

    pub fn reset(&mut self) {
        self.members.clear();
        self.members.push(self.local);
    }
}
