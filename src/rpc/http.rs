//! `PeerTransport` over HTTP/JSON.
//!
//! Every node serves the same port, so a peer's URL is derived from its address
//! alone. Only connection failures are retried: a call that reached the peer
//! and timed out may already have been applied.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::protocol::*;
use super::transport::PeerTransport;
use crate::config::NodeConfig;
use crate::membership::types::Address;

pub struct HttpTransport {
    http_client: reqwest::Client,
    port: u16,
    timeout: Duration,
    attempts: usize,
}

impl HttpTransport {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            port: config.rpc_port,
            timeout: config.rpc_timeout,
            attempts: config.rpc_attempts.max(1),
        }
    }

    pub fn url(&self, peer: Address, endpoint: &str) -> String {
        format!("http://{}:{}{}", peer, self.port, endpoint)
    }

    async fn post_with_retry<T: Serialize>(
        &self,
        url: String,
        payload: &T,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_connect() && attempt + 1 < self.attempts => {
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
                Err(e) => return Err(anyhow::anyhow!(e)),
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    async fn post_ack<T: Serialize>(&self, url: String, payload: &T) -> Result<RpcReply> {
        let response = self.post_with_retry(url, payload).await?;
        let status = response.status();
        let ack: AckResponse = response.json().await?;

        if !status.is_success() || !ack.success {
            return Err(anyhow::anyhow!(
                "rejected ({}): {}",
                status,
                ack.error.unwrap_or_default()
            ));
        }
        Ok(RpcReply::Ack)
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn call(&self, peer: Address, call: RpcCall) -> Result<RpcReply> {
        let url = self.url(peer, call.endpoint());

        match call {
            RpcCall::Join { requester } => {
                let response = self.post_with_retry(url, &JoinRequest { requester }).await?;
                if !response.status().is_success() {
                    return Err(anyhow::anyhow!("Join failed {}", response.status()));
                }
                let join: JoinResponse = response.json().await?;
                Ok(RpcReply::Peers(join.peers))
            }
            RpcCall::StartCalculation { value, algorithm } => {
                self.post_ack(url, &StartCalculationRequest { value, algorithm })
                    .await
            }
            RpcCall::TakeToken => self.post_ack(url, &TakeTokenRequest {}).await,
            RpcCall::RequestToken {
                timestamp,
                requester,
            } => {
                self.post_ack(
                    url,
                    &RequestTokenRequest {
                        timestamp,
                        requester,
                    },
                )
                .await
            }
            RpcCall::ReplyOk { replier } => self.post_ack(url, &ReplyOkRequest { replier }).await,
            RpcCall::PropagateState { op, operand } => {
                self.post_ack(url, &PropagateStateRequest { op, operand })
                    .await
            }
            RpcCall::SignOff { departing } => {
                self.post_ack(url, &SignOffRequest { departing }).await
            }
        }
    }
}
