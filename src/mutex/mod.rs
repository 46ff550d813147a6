//! Mutual-Exclusion Engine Module
//!
//! Runs the shared calculation while guaranteeing that only one member of the network is
//! inside the critical section at a time.
//!
//! ## Lifecycle
//! `Idle -> RequestingAccess -> InCriticalSection -> Releasing -> Idle`, repeated until the
//! configured duration elapses, then `Done`.
//!
//! ## Strategies
//! - **`token_ring`**: A single token travels along the membership order.
//! - **`ricart_agrawala`**: Timestamped broadcast requests and a quorum of OK replies.
//!
//! The strategy is a closed enum chosen by name at runtime; the run loop, value updates and
//! state propagation in `engine` are shared.

pub mod engine;
pub mod ricart_agrawala;
pub mod token_ring;
pub mod types;

#[cfg(test)]
mod tests;
