use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::membership::types::Address;

/// Snapshot of a Lamport clock: `(counter, owner)`.
///
/// The derived ordering is lexicographic over the fields, i.e. counter first,
/// owner address (numeric octet order) as tie-break. No node-local state enters
/// the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub counter: u64,
    pub owner: Address,
}

impl Timestamp {
    pub const fn new(counter: u64, owner: Address) -> Self {
        Self { counter, owner }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.counter, self.owner)
    }
}

/// Per-node Lamport clock.
///
/// Mutation takes `&mut self`; the engine keeps the clock inside its state lock,
/// which serializes the worker and the RPC handlers.
#[derive(Debug, Clone)]
pub struct LamportClock {
    counter: u64,
    owner: Address,
}

impl LamportClock {
    pub fn new(owner: Address) -> Self {
        Self { counter: 0, owner }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.counter, self.owner)
    }

    pub fn local_event(&mut self) -> Timestamp {
        self.counter += 1;
        self.now()
    }

    pub fn send_event(&mut self) -> Timestamp {
        self.local_event()
    }

    /// Fast-forwards past `remote` and ticks once.
    pub fn receive_event(&mut self, remote: Timestamp) -> Timestamp {
        self.counter = self.counter.max(remote.counter);
        self.counter += 1;
        self.now()
    }

    /// Total order over timestamps from any two nodes.
    pub fn compare(a: &Timestamp, b: &Timestamp) -> Ordering {
        a.cmp(b)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}
