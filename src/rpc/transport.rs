use async_trait::async_trait;

use super::protocol::{RpcCall, RpcReply};
use crate::membership::types::Address;

/// "Send this call to this peer and give me the result or a failure."
///
/// Implementations must be callable concurrently from the calculation worker
/// and from inbound handlers.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn call(&self, peer: Address, call: RpcCall) -> anyhow::Result<RpcReply>;
}
