use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::clock::lamport::Timestamp;
use crate::config::NodeConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::membership::service::MembershipService;
use crate::membership::types::Address;
use crate::mutex::engine::Engine;
use crate::mutex::types::{Algorithm, Grant, MathOp};
use crate::rpc::protocol::{RpcCall, RpcReply};
use crate::rpc::transport::PeerTransport;

/// Read-only snapshot for status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub address: Address,
    pub members: Vec<Address>,
    pub algorithm: Algorithm,
    pub current_value: i64,
    pub running: bool,
    pub has_token: bool,
}

pub struct Node {
    pub address: Address,
    pub membership: Arc<MembershipService>,
    transport: Arc<dyn PeerTransport>,
    config: NodeConfig,
    engine: RwLock<Arc<Engine>>,
    worker: Mutex<Option<JoinHandle<i64>>>,
}

impl Node {
    pub fn new(address: Address, transport: Arc<dyn PeerTransport>, config: NodeConfig) -> Arc<Self> {
        let membership = MembershipService::new(address);
        let engine = Engine::new(
            Algorithm::TokenRing,
            membership.clone(),
            transport.clone(),
            config.clone(),
        );

        Arc::new(Self {
            address,
            membership,
            transport,
            config,
            engine: RwLock::new(engine),
            worker: Mutex::new(None),
        })
    }

    /// The currently active engine.
    pub async fn engine(&self) -> Arc<Engine> {
        self.engine.read().await.clone()
    }

    pub async fn members(&self) -> Vec<Address> {
        self.membership.members().await
    }

    pub async fn status(&self) -> NodeStatus {
        let engine = self.engine().await.snapshot().await;
        NodeStatus {
            address: self.address,
            members: self.membership.members().await,
            algorithm: engine.algorithm,
            current_value: engine.current_value,
            running: engine.running,
            has_token: engine.has_token,
        }
    }

    async fn call(&self, peer: Address, call: RpcCall) -> ClusterResult<RpcReply> {
        let method = call.method();
        self.transport
            .call(peer, call)
            .await
            .map_err(|e| ClusterError::unreachable(&peer, &e.context(method)))
    }

    // ============================================================
    // SHELL OPERATIONS
    // ============================================================

    /// Joins the network `target` belongs to. Only a solitary node may join.
    ///
    /// Every member learned along the way that this node did not know yet is
    /// sent a `join` too, and whatever it reports back is folded in, so views
    /// that differ between members still converge.
    pub async fn join(&self, target: Address) -> ClusterResult<()> {
        if target == self.address {
            return Err(ClusterError::InvalidJoinState {
                reason: "a node cannot join itself".to_string(),
            });
        }
        if !self.membership.snapshot().await.is_solitary() {
            return Err(ClusterError::InvalidJoinState {
                reason: "already part of a network, sign off first".to_string(),
            });
        }

        let peers = self
            .call(target, RpcCall::Join { requester: self.address })
            .await?
            .into_peers();

        if peers.is_empty() {
            info!("{} already lists us as a member", target);
            self.membership.merge(vec![target]).await;
            return Ok(());
        }

        let mut pending: VecDeque<Address> = self
            .membership
            .merge(peers)
            .await
            .into_iter()
            .filter(|addr| *addr != target)
            .collect();

        while let Some(peer) = pending.pop_front() {
            match self.call(peer, RpcCall::Join { requester: self.address }).await {
                Ok(reply) => {
                    let discovered = self.membership.merge(reply.into_peers()).await;
                    pending.extend(discovered);
                }
                Err(e) => tracing::warn!("Could not announce join: {}", e),
            }
        }

        info!(
            "Joined network via {}, members: {:?}",
            target,
            self.membership.members().await
        );
        Ok(())
    }

    /// Tells every peer this node is leaving, then collapses the view to
    /// itself. Unreachable peers do not stop the loop.
    pub async fn sign_off(&self) {
        for peer in self.membership.peers().await {
            if let Err(e) = self
                .call(peer, RpcCall::SignOff { departing: self.address })
                .await
            {
                tracing::warn!("Sign-off not delivered: {}", e);
            }
        }

        self.membership.reset().await;
        info!("Signed off, now solitary");
    }

    /// Swaps in a fresh engine for `name`. While a calculation is running the
    /// current engine is kept. Returns the active algorithm.
    pub async fn select_algorithm(&self, name: &str) -> Algorithm {
        let algorithm = Algorithm::from_name(name);
        let mut engine = self.engine.write().await;

        if engine.is_running().await {
            tracing::warn!(
                "Calculation in progress, keeping {} instead of {}",
                engine.algorithm(),
                algorithm
            );
            return engine.algorithm();
        }

        *engine = Engine::new(
            algorithm,
            self.membership.clone(),
            self.transport.clone(),
            self.config.clone(),
        );
        info!("Using {}", algorithm);
        algorithm
    }

    /// Starts a distributed calculation from this node.
    ///
    /// This node is the known origin, so it is seeded with the token before
    /// every other member is told to start.
    pub async fn start_calculation(&self, value: i64, name: &str) -> ClusterResult<()> {
        if self.engine().await.is_running().await {
            return Err(ClusterError::CalculationInProgress);
        }

        let algorithm = self.select_algorithm(name).await;
        let engine = self.engine().await;
        engine.seed_token().await;

        info!("Telling peers to prepare for a {} calculation", algorithm);
        for peer in self.membership.peers().await {
            let call = RpcCall::StartCalculation {
                value,
                algorithm: algorithm.name().to_string(),
            };
            if let Err(e) = self.call(peer, call).await {
                tracing::warn!("Peer will not take part: {}", e);
            }
        }

        self.launch(&engine, value).await;
        Ok(())
    }

    async fn launch(&self, engine: &Arc<Engine>, value: i64) {
        if let Some(handle) = engine.start(value).await {
            let previous = self.worker.lock().await.replace(handle);
            if previous.is_some_and(|handle| !handle.is_finished()) {
                tracing::warn!("Replacing a calculation worker that has not finished");
            }
        }
    }

    /// Joins the calculation worker, if any, and returns its final value.
    pub async fn wait_for_calculation(&self) -> Option<i64> {
        let handle = self.worker.lock().await.take()?;
        match handle.await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Calculation worker failed: {}", e);
                None
            }
        }
    }

    /// Signs off and waits for a running calculation to finish.
    pub async fn shutdown(&self) -> Option<i64> {
        self.sign_off().await;
        self.wait_for_calculation().await
    }

    // ============================================================
    // INBOUND RPC EFFECTS
    // ============================================================

    pub async fn handle_join(&self, requester: Address) -> Vec<Address> {
        self.membership.handle_join(requester).await
    }

    pub async fn handle_sign_off(&self, departing: Address) -> bool {
        let removed = self.membership.handle_sign_off(departing).await;
        if removed {
            self.engine().await.forget_member(departing).await;
        }
        removed
    }

    pub async fn handle_start_calculation(&self, value: i64, name: &str) {
        info!("Starting distributed calculation with value {}", value);
        self.select_algorithm(name).await;
        let engine = self.engine().await;
        self.launch(&engine, value).await;
    }

    pub async fn handle_take_token(&self) -> ClusterResult<()> {
        self.engine().await.acquire(Grant::Token).await
    }

    pub async fn handle_request_token(&self, timestamp: u64, requester: Address) -> ClusterResult<()> {
        self.engine()
            .await
            .receive_request(Timestamp::new(timestamp, requester))
            .await
    }

    pub async fn handle_reply_ok(&self, replier: Address) -> ClusterResult<()> {
        self.engine().await.acquire(Grant::Reply(replier)).await
    }

    pub async fn handle_propagate_state(&self, op: MathOp, operand: i64) {
        tracing::debug!("Received {}({})", op, operand);
        self.engine().await.update(op, operand).await;
    }
}
