//! Membership Module
//!
//! Tracks which peers make up the network and mediates joining and leaving.
//!
//! ## Core Mechanisms
//! - **Canonical ordering**: The view is kept sorted by numeric octet order, which is
//!   also the token ring order and the clock tie-break order.
//! - **Solitary join**: A node may only join while it is alone; the target hands back its
//!   view so the joiner can announce itself to everyone transitively.
//! - **Sign-off**: A leaving node notifies every peer and collapses its own view to itself.

pub mod service;
pub mod types;
