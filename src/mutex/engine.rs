//! Engine core: the run loop, the access gate and the pieces both strategies share.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::ricart_agrawala::RicartAgrawala;
use super::token_ring::TokenRing;
use super::types::{Algorithm, CalculationState, Grant, MathOp};
use crate::clock::lamport::Timestamp;
use crate::config::NodeConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::membership::service::MembershipService;
use crate::membership::types::Address;
use crate::rpc::protocol::{RpcCall, RpcReply};
use crate::rpc::transport::PeerTransport;

/// Per-strategy state.
#[derive(Debug)]
pub enum Strategy {
    TokenRing(TokenRing),
    RicartAgrawala(RicartAgrawala),
}

impl Strategy {
    fn reset(&mut self) {
        match self {
            Self::TokenRing(ring) => ring.reset(),
            Self::RicartAgrawala(ra) => ra.reset(),
        }
    }
}

/// Everything guarded by the engine lock.
#[derive(Debug)]
pub struct EngineState {
    pub calc: CalculationState,
    pub strategy: Strategy,
}

impl EngineState {
    pub(super) fn token_ring(&mut self) -> Option<&mut TokenRing> {
        match &mut self.strategy {
            Strategy::TokenRing(ring) => Some(ring),
            Strategy::RicartAgrawala(_) => None,
        }
    }

    pub(super) fn ricart_agrawala(&mut self) -> Option<&mut RicartAgrawala> {
        match &mut self.strategy {
            Strategy::RicartAgrawala(ra) => Some(ra),
            Strategy::TokenRing(_) => None,
        }
    }

    fn has_access(&self) -> bool {
        match &self.strategy {
            Strategy::TokenRing(ring) => ring.has_token,
            Strategy::RicartAgrawala(ra) => ra.quorum_reached(),
        }
    }
}

/// Point-in-time view of an engine for status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub algorithm: Algorithm,
    pub current_value: i64,
    pub running: bool,
    pub has_token: bool,
    pub in_critical_section: bool,
}

/// One mutual-exclusion engine instance.
///
/// The calculation worker and inbound RPC handlers share it. All mutable state
/// sits behind one lock that is never held across an outbound call; the worker
/// parks on `access` until the strategy grants entry.
pub struct Engine {
    algorithm: Algorithm,
    pub(super) local: Address,
    pub(super) membership: Arc<MembershipService>,
    transport: Arc<dyn PeerTransport>,
    pub(super) config: NodeConfig,
    pub(super) state: Mutex<EngineState>,
    pub(super) access: Notify,
}

impl Engine {
    pub fn new(
        algorithm: Algorithm,
        membership: Arc<MembershipService>,
        transport: Arc<dyn PeerTransport>,
        config: NodeConfig,
    ) -> Arc<Self> {
        let local = membership.local_address;
        let strategy = match algorithm {
            Algorithm::TokenRing => Strategy::TokenRing(TokenRing::default()),
            Algorithm::RicartAgrawala => Strategy::RicartAgrawala(RicartAgrawala::new(local)),
        };

        Arc::new(Self {
            algorithm,
            local,
            membership,
            transport,
            config,
            state: Mutex::new(EngineState {
                calc: CalculationState::default(),
                strategy,
            }),
            access: Notify::new(),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.calc.is_running()
    }

    pub async fn current_value(&self) -> i64 {
        self.state.lock().await.calc.current_value
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.lock().await;
        let has_token = match &state.strategy {
            Strategy::TokenRing(ring) => ring.has_token,
            Strategy::RicartAgrawala(_) => false,
        };
        EngineSnapshot {
            algorithm: self.algorithm,
            current_value: state.calc.current_value,
            running: state.calc.is_running(),
            has_token,
            in_critical_section: state.calc.in_critical_section,
        }
    }

    /// Marks this engine as the origin of the token. No effect for
    /// Ricart-Agrawala.
    pub async fn seed_token(&self) {
        let mut state = self.state.lock().await;
        if let Some(ring) = state.token_ring() {
            ring.has_token = true;
        }
    }

    /// Seeds the value and spawns the run loop. Returns `None` if a calculation
    /// is already running on this engine.
    pub async fn start(self: &Arc<Self>, initial_value: i64) -> Option<JoinHandle<i64>> {
        let started_at = {
            let mut state = self.state.lock().await;
            if state.calc.is_running() {
                tracing::warn!("{} calculation already running, ignoring start", self.algorithm);
                return None;
            }
            let now = Instant::now();
            state.calc.current_value = initial_value;
            state.calc.started_at = Some(now);
            now
        };

        tracing::info!(
            "Starting {} calculation with value {}",
            self.algorithm,
            initial_value
        );

        let engine = self.clone();
        Some(tokio::spawn(async move { engine.run(started_at).await }))
    }

    /// Worker body. Returns the final value.
    async fn run(self: Arc<Self>, started_at: Instant) -> i64 {
        let deadline = started_at + self.config.duration;
        let mut rounds = 0u64;

        // Give the initiator time to reach every peer before the first request.
        tokio::time::sleep(self.idle_pause()).await;

        while Instant::now() < deadline {
            if !self.request_access(deadline).await {
                tracing::info!("Duration elapsed while waiting for access");
                break;
            }

            let (op, operand) = {
                let mut rng = rand::thread_rng();
                MathOp::generate(&mut rng)
            };
            self.update(op, operand).await;
            self.propagate_state(op, operand).await;
            self.release().await;
            rounds += 1;

            tokio::time::sleep(self.idle_pause()).await;
        }

        tracing::debug!("Run loop finished after {} rounds", rounds);
        self.done().await
    }

    async fn request_access(&self, deadline: Instant) -> bool {
        match self.algorithm {
            Algorithm::TokenRing => self.token_ring_request(deadline).await,
            Algorithm::RicartAgrawala => self.ricart_agrawala_request(deadline).await,
        }
    }

    /// Hands access on after the critical section.
    pub async fn release(&self) {
        match self.algorithm {
            Algorithm::TokenRing => self.token_ring_release().await,
            Algorithm::RicartAgrawala => self.ricart_agrawala_release().await,
        }
    }

    /// Records a grant: the token or a peer's OK reply.
    pub async fn acquire(&self, grant: Grant) -> ClusterResult<()> {
        match (self.algorithm, grant) {
            (Algorithm::TokenRing, Grant::Token) => {
                self.token_ring_acquire().await;
                Ok(())
            }
            (Algorithm::RicartAgrawala, Grant::Reply(replier)) => {
                self.ricart_agrawala_acquire(replier).await;
                Ok(())
            }
            (Algorithm::TokenRing, Grant::Reply(_)) => Err(self.misuse("reply_ok")),
            (Algorithm::RicartAgrawala, Grant::Token) => Err(self.misuse("take_token")),
        }
    }

    /// Inbound `request_token`.
    pub async fn receive_request(&self, remote: Timestamp) -> ClusterResult<()> {
        match self.algorithm {
            Algorithm::RicartAgrawala => {
                self.ricart_agrawala_receive(remote).await;
                Ok(())
            }
            Algorithm::TokenRing => Err(self.misuse("request_token")),
        }
    }

    /// A peer left gracefully.
    pub async fn forget_member(&self, departed: Address) {
        if self.algorithm == Algorithm::RicartAgrawala {
            self.ricart_agrawala_forget(departed).await;
        }
    }

    /// Applies one operation to the shared value.
    pub async fn update(&self, op: MathOp, operand: i64) -> i64 {
        let mut state = self.state.lock().await;
        let before = state.calc.current_value;
        let after = op.apply(before, operand);
        state.calc.current_value = after;
        tracing::info!("Performing {}({}, {}) = {}", op, before, operand, after);
        after
    }

    /// Sends the operation to every other member. Unreachable peers are
    /// logged and skipped.
    pub async fn propagate_state(&self, op: MathOp, operand: i64) {
        for peer in self.membership.peers().await {
            if let Err(e) = self.send(peer, RpcCall::PropagateState { op, operand }).await {
                tracing::warn!("Failed to propagate state: {}", e);
            }
        }
    }

    /// Reports the final value and clears all per-round state so a new
    /// `start` runs cleanly. The value itself is kept as the last result.
    pub async fn done(&self) -> i64 {
        let mut state = self.state.lock().await;
        state.calc.needs_critical_section = false;
        state.calc.in_critical_section = false;
        state.calc.started_at = None;
        state.strategy.reset();

        let value = state.calc.current_value;
        tracing::info!("{} calculation done, final result: {}", self.algorithm, value);
        value
    }

    /// Parks until `has_access` holds or the deadline passes. On success the
    /// engine is marked as inside the critical section under the same lock.
    pub(super) async fn wait_for_access(&self, deadline: Instant) -> bool {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.has_access() {
                    state.calc.in_critical_section = true;
                    return true;
                }
            }

            // notify_one stores a permit when nobody waits, so a grant landing
            // between the check above and this await is not lost.
            if tokio::time::timeout_at(deadline, self.access.notified())
                .await
                .is_err()
            {
                let mut state = self.state.lock().await;
                if state.has_access() {
                    state.calc.in_critical_section = true;
                    return true;
                }
                return false;
            }
        }
    }

    pub(super) async fn send(&self, peer: Address, call: RpcCall) -> ClusterResult<RpcReply> {
        let method = call.method();
        tracing::debug!("-> {} {}", peer, method);
        self.transport
            .call(peer, call)
            .await
            .map_err(|e| ClusterError::unreachable(&peer, &e.context(method)))
    }

    fn idle_pause(&self) -> Duration {
        let min = self.config.idle_min.as_millis() as u64;
        let max = (self.config.idle_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn misuse(&self, method: &'static str) -> ClusterError {
        ClusterError::ProtocolMisuse {
            method,
            algorithm: self.algorithm.label(),
        }
    }
}
