//! Distributed Mutual-Exclusion Calculation Library
//!
//! A peer-to-peer network of nodes that cooperatively mutate one shared value. Every
//! mutation happens inside a critical section guarded by one of two interchangeable
//! distributed mutual-exclusion algorithms.
//!
//! ## Architecture Modules
//! - **`clock`**: Lamport logical clock with a deterministic cross-node total order.
//! - **`membership`**: Addresses, the sorted membership view, and join/sign-off effects.
//! - **`mutex`**: The engine run loop plus the Token Ring and Ricart-Agrawala strategies.
//! - **`node`**: The explicit per-node context every RPC and shell operation goes through.
//! - **`rpc`**: Call vocabulary, the transport seam (HTTP and in-process), and axum handlers.
//! - **`config`** / **`error`**: Node settings and the shared error taxonomy.

pub mod clock;
pub mod config;
pub mod error;
pub mod membership;
pub mod mutex;
pub mod node;
pub mod rpc;
