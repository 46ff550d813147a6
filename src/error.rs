//! Error taxonomy shared by the node, the engines and the RPC layer.
//!
//! Outbound transport failures travel as `anyhow::Error` until they reach the
//! node boundary, where they are wrapped into [`ClusterError::PeerUnreachable`].

use thiserror::Error;

use crate::membership::types::Address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// An outbound call could not reach the peer or returned a failure.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: Address, reason: String },

    /// `join` was attempted while this node is not allowed to join.
    #[error("invalid join state: {reason}")]
    InvalidJoinState { reason: String },

    /// A call that belongs to the other mutual-exclusion algorithm.
    #[error("{method} is not available while running {algorithm}")]
    ProtocolMisuse {
        method: &'static str,
        algorithm: &'static str,
    },

    /// `start_calculation` while this node's worker is still running.
    #[error("a calculation is already in progress")]
    CalculationInProgress,

    /// A string that is not a dotted-quad address.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}

impl ClusterError {
    pub fn unreachable(peer: &Address, err: &anyhow::Error) -> Self {
        Self::PeerUnreachable {
            peer: *peer,
            reason: format!("{err:#}"),
        }
    }
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
