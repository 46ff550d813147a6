use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::types::{Address, MembershipView};

/// Shared handle on the local membership view.
///
/// Both the calculation worker and inbound RPC handlers read the view, so it
/// sits behind an async lock. Outbound calls are never made while it is held.
pub struct MembershipService {
    pub local_address: Address,
    view: RwLock<MembershipView>,
}

impl MembershipService {
    pub fn new(local_address: Address) -> Arc<Self> {
        Arc::new(Self {
            local_address,
            view: RwLock::new(MembershipView::new(local_address)),
        })
    }

    pub async fn snapshot(&self) -> MembershipView {
        self.view.read().await.clone()
    }

    pub async fn members(&self) -> Vec<Address> {
        self.view.read().await.members().to_vec()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.view.read().await.len()
    }

    pub async fn peers(&self) -> Vec<Address> {
        self.view.read().await.peers()
    }

    pub async fn successor(&self) -> Option<Address> {
        self.view.read().await.successor()
    }

    /// Inbound `join`: registers `requester` and returns the members it did not
    /// know about yet (everyone but itself). An already known requester gets an
    /// empty list, which the caller reads as "nothing to do".
    pub async fn handle_join(&self, requester: Address) -> Vec<Address> {
        let mut view = self.view.write().await;

        if !view.insert(requester) {
            tracing::debug!("{} asked to join but is already a member", requester);
            return Vec::new();
        }

        info!("{} joined, network size now {}", requester, view.len());

        view.members()
            .iter()
            .filter(|addr| **addr != requester)
            .copied()
            .collect()
    }

    /// Inbound `sign_off`. Returns whether `departing` was a member.
    pub async fn handle_sign_off(&self, departing: Address) -> bool {
        let mut view = self.view.write().await;

        if view.remove(&departing) {
            info!("{} signed off, network size now {}", departing, view.len());
            true
        } else {
            tracing::warn!(
                "{} signed off but was not registered here, continuing",
                departing
            );
            false
        }
    }

    /// Unions a peer list received from a join target. Returns the newly
    /// discovered addresses.
    pub async fn merge(&self, addrs: Vec<Address>) -> Vec<Address> {
        self.view.write().await.merge(addrs)
    }

    pub async fn reset(&self) {
        self.view.write().await.reset();
    }
}
