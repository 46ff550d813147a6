//! Logical Clock Module
//!
//! Lamport clock with a deterministic cross-node total order: timestamps compare by
//! counter first and by owner address second, so every node ranks two concurrent
//! requests the same way.

pub mod lamport;
