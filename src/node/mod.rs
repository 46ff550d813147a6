//! Node Module
//!
//! The explicit per-node context: one membership view, one active mutual-exclusion engine,
//! the calculation worker handle and the transport to reach peers. Every inbound RPC and
//! every shell operation goes through a `Node`, so several nodes can live in one process.

pub mod service;
