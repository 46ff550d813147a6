//! Token Ring strategy.
//!
//! The ring order is the membership order; each node's successor is the next
//! address, wrapping around. Holding the token is necessary and sufficient to
//! enter the critical section. The successor is recomputed at every hand-off, so
//! joins and sign-offs between rounds are picked up.

use tokio::time::Instant;

use super::engine::Engine;
use crate::rpc::protocol::RpcCall;

#[derive(Debug, Default, Clone)]
pub struct TokenRing {
    pub has_token: bool,
}

impl TokenRing {
    pub fn reset(&mut self) {
        self.has_token = false;
    }
}

impl Engine {
    pub(super) async fn token_ring_request(&self, deadline: Instant) -> bool {
        {
            let mut state = self.state.lock().await;
            state.calc.needs_critical_section = true;
        }

        if self.wait_for_access(deadline).await {
            return true;
        }

        self.state.lock().await.calc.needs_critical_section = false;
        false
    }

    /// Inbound `take_token`. Wakes the worker if it is waiting; otherwise the
    /// token is held until the next local round.
    pub(super) async fn token_ring_acquire(&self) {
        let mut state = self.state.lock().await;
        let waiting = state.calc.needs_critical_section;

        let Some(ring) = state.token_ring() else {
            return;
        };
        if ring.has_token {
            tracing::warn!("Received a token while already holding one");
        }
        ring.has_token = true;

        if waiting {
            tracing::debug!("Token received, entering critical section");
            self.access.notify_one();
        } else {
            tracing::debug!("Token received, holding it until the next round");
        }
    }

    pub(super) async fn token_ring_release(&self) {
        let successor = self.membership.successor().await;

        let next = {
            let mut state = self.state.lock().await;
            debug_assert!(
                !state.calc.needs_critical_section || state.calc.in_critical_section,
                "release without access"
            );
            state.calc.needs_critical_section = false;
            state.calc.in_critical_section = false;

            match (state.token_ring(), successor) {
                (Some(ring), Some(next)) if ring.has_token => {
                    ring.has_token = false;
                    Some(next)
                }
                _ => None,
            }
        };

        let Some(next) = next else {
            return;
        };

        match self.send(next, RpcCall::TakeToken).await {
            Ok(_) => {
                tracing::debug!("Token passed to {}", next);
                tokio::time::sleep(self.config.token_pause).await;
            }
            Err(e) => {
                // Keep the token rather than lose it; the next round retries.
                tracing::warn!("Could not pass the token: {}", e);
                if let Some(ring) = self.state.lock().await.token_ring() {
                    ring.has_token = true;
                }
            }
        }
    }
}
