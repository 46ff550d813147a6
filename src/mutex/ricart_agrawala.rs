//! Ricart-Agrawala strategy.
//!
//! A requester stamps a send event on its Lamport clock, broadcasts the stamp and
//! enters once every current member has replied OK. A node that receives a request
//! while it holds the resource, or while its own pending request ranks first,
//! defers the reply until it releases.

use std::collections::{BTreeSet, VecDeque};
use tokio::time::Instant;

use super::engine::Engine;
use crate::clock::lamport::{LamportClock, Timestamp};
use crate::membership::types::Address;
use crate::mutex::types::CalculationState;
use crate::rpc::protocol::RpcCall;

/// What to do with an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    ReplyNow,
    Defer,
}

#[derive(Debug, Clone)]
pub struct RicartAgrawala {
    pub clock: LamportClock,
    /// Stamp of the outstanding local request, if any.
    pub request_stamp: Option<Timestamp>,
    /// Members that replied OK in the current round.
    pub replies: BTreeSet<Address>,
    /// Requesters waiting for our OK, in arrival order.
    pub deferred: VecDeque<Address>,
    quorum: bool,
}

impl RicartAgrawala {
    pub fn new(local: Address) -> Self {
        Self {
            clock: LamportClock::new(local),
            request_stamp: None,
            replies: BTreeSet::new(),
            deferred: VecDeque::new(),
            quorum: false,
        }
    }

    pub fn quorum_reached(&self) -> bool {
        self.quorum
    }

    /// Starts a new round: stamps a send event and clears the tracker.
    pub fn begin_request(&mut self) -> Timestamp {
        let stamp = self.clock.send_event();
        self.request_stamp = Some(stamp);
        self.replies.clear();
        self.quorum = false;
        stamp
    }

    /// Adds `replier` to the tracker. Returns `true` when this reply completes
    /// the quorum, i.e. every one of `members` has replied. Replies from
    /// addresses outside `members` are dropped.
    pub fn record_reply(&mut self, replier: Address, members: &[Address]) -> bool {
        if self.request_stamp.is_none() {
            tracing::debug!("Ignoring OK from {}: no request outstanding", replier);
            return false;
        }
        if !members.contains(&replier) {
            tracing::debug!("Ignoring OK from {}: not a current member", replier);
            return false;
        }
        self.replies.insert(replier);
        self.check_quorum(members)
    }

    /// Drops a departed member from the tracker and re-evaluates the quorum.
    pub fn forget(&mut self, departed: &Address, members: &[Address]) -> bool {
        self.replies.remove(departed);
        self.deferred.retain(|addr| addr != departed);
        self.request_stamp.is_some() && self.check_quorum(members)
    }

    fn check_quorum(&mut self, members: &[Address]) -> bool {
        // Stale entries from departed members do not count either way.
        let complete = members.iter().all(|member| self.replies.contains(member));
        let newly = complete && !self.quorum;
        self.quorum = complete;
        newly
    }

    /// Classifies an incoming request and queues the requester when deferred.
    pub fn receive_request(
        &mut self,
        calc: &CalculationState,
        remote: Timestamp,
    ) -> RequestDecision {
        self.clock.receive_event(remote);

        let decision = if !calc.needs_critical_section {
            RequestDecision::ReplyNow
        } else if calc.in_critical_section {
            RequestDecision::Defer
        } else {
            match self.request_stamp {
                Some(local) if LamportClock::compare(&local, &remote).is_lt() => {
                    RequestDecision::Defer
                }
                _ => RequestDecision::ReplyNow,
            }
        };

        if decision == RequestDecision::Defer {
            self.deferred.push_back(remote.owner);
        }
        decision
    }

    /// Ends the round and hands back every deferred requester.
    pub fn finish_request(&mut self) -> Vec<Address> {
        self.request_stamp = None;
        self.replies.clear();
        self.quorum = false;
        self.deferred.drain(..).collect()
    }

    pub fn reset(&mut self) {
        self.finish_request();
        self.clock.reset();
    }
}

impl Engine {
    pub(super) async fn ricart_agrawala_request(&self, deadline: Instant) -> bool {
        let members = self.membership.members().await;

        let stamp = {
            let mut state = self.state.lock().await;
            state.calc.needs_critical_section = true;
            let Some(ra) = state.ricart_agrawala() else {
                return false;
            };
            let stamp = ra.begin_request();
            // Our own request is answered on the spot.
            ra.record_reply(self.local, &members);
            stamp
        };

        tracing::debug!("Requesting access with {}", stamp);

        for peer in members.iter().filter(|addr| **addr != self.local) {
            let call = RpcCall::RequestToken {
                timestamp: stamp.counter,
                requester: self.local,
            };
            if let Err(e) = self.send(*peer, call).await {
                tracing::warn!("Request not delivered, round may stall: {}", e);
            }
        }

        if self.wait_for_access(deadline).await {
            return true;
        }

        // Gave up at the deadline: do not keep anyone waiting on us.
        self.ricart_agrawala_release().await;
        false
    }

    /// Inbound `request_token`.
    pub(super) async fn ricart_agrawala_receive(&self, remote: Timestamp) {
        let decision = {
            let mut state = self.state.lock().await;
            let calc = state.calc.clone();
            let Some(ra) = state.ricart_agrawala() else {
                return;
            };
            ra.receive_request(&calc, remote)
        };

        match decision {
            RequestDecision::ReplyNow => self.reply_ok(remote.owner).await,
            RequestDecision::Defer => {
                tracing::debug!("Deferring reply to {}", remote.owner)
            }
        }
    }

    /// Inbound `reply_ok`.
    pub(super) async fn ricart_agrawala_acquire(&self, replier: Address) {
        let members = self.membership.members().await;
        let mut state = self.state.lock().await;
        let Some(ra) = state.ricart_agrawala() else {
            return;
        };

        tracing::debug!("OK from {}", replier);
        if ra.record_reply(replier, &members) {
            tracing::debug!("Quorum of {} reached", members.len());
            self.access.notify_one();
        }
    }

    pub(super) async fn ricart_agrawala_forget(&self, departed: Address) {
        let members = self.membership.members().await;
        let mut state = self.state.lock().await;
        if let Some(ra) = state.ricart_agrawala() {
            if ra.forget(&departed, &members) {
                tracing::debug!("Quorum reached after {} left", departed);
                self.access.notify_one();
            }
        }
    }

    pub(super) async fn ricart_agrawala_release(&self) {
        let deferred = {
            let mut state = self.state.lock().await;
            state.calc.needs_critical_section = false;
            state.calc.in_critical_section = false;
            match state.ricart_agrawala() {
                Some(ra) => ra.finish_request(),
                None => Vec::new(),
            }
        };

        for requester in deferred {
            self.reply_ok(requester).await;
        }
    }

    async fn reply_ok(&self, requester: Address) {
        if requester == self.local {
            self.ricart_agrawala_acquire(requester).await;
            return;
        }
        if let Err(e) = self
            .send(requester, RpcCall::ReplyOk { replier: self.local })
            .await
        {
            tracing::warn!("Failed to send OK: {}", e);
        }
    }
}
