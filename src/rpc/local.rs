//! In-process network.
//!
//! Nodes register under their address; a call is dispatched straight into the
//! target node. Any address can be marked unreachable to simulate a vanished
//! peer.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Weak};

use super::dispatch::dispatch;
use super::protocol::{RpcCall, RpcReply};
use super::transport::PeerTransport;
use crate::config::NodeConfig;
use crate::membership::types::Address;
use crate::node::service::Node;

#[derive(Default)]
pub struct LocalNetwork {
    nodes: DashMap<Address, Weak<Node>>,
    unreachable: DashSet<Address>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a node wired to this network and registers it.
    pub fn spawn_node(self: &Arc<Self>, address: Address, config: NodeConfig) -> Arc<Node> {
        let node = Node::new(address, self.clone(), config);
        self.nodes.insert(address, Arc::downgrade(&node));
        node
    }

    pub fn set_reachable(&self, address: Address, reachable: bool) {
        if reachable {
            self.unreachable.remove(&address);
        } else {
            self.unreachable.insert(address);
        }
    }

    fn resolve(&self, address: &Address) -> Option<Arc<Node>> {
        if self.unreachable.contains(address) {
            return None;
        }
        self.nodes.get(address).and_then(|entry| entry.value().upgrade())
    }
}

#[async_trait]
impl PeerTransport for LocalNetwork {
    async fn call(&self, peer: Address, call: RpcCall) -> anyhow::Result<RpcReply> {
        let node = self
            .resolve(&peer)
            .ok_or_else(|| anyhow::anyhow!("no route to {}", peer))?;

        dispatch(&node, call).await.map_err(anyhow::Error::from)
    }
}
