//! RPC Protocol
//!
//! Endpoint constants, the call/reply vocabulary every transport carries, and the
//! JSON bodies the HTTP transport puts on the wire.

use serde::{Deserialize, Serialize};

use crate::membership::types::Address;
use crate::mutex::types::MathOp;

// --- API Endpoints ---

pub const ENDPOINT_JOIN: &str = "/rpc/join";
pub const ENDPOINT_START_CALCULATION: &str = "/rpc/start_calculation";
pub const ENDPOINT_TAKE_TOKEN: &str = "/rpc/take_token";
pub const ENDPOINT_REQUEST_TOKEN: &str = "/rpc/request_token";
pub const ENDPOINT_REPLY_OK: &str = "/rpc/reply_ok";
pub const ENDPOINT_PROPAGATE_STATE: &str = "/rpc/propagate_state";
pub const ENDPOINT_SIGN_OFF: &str = "/rpc/sign_off";
/// Read-only status snapshot (GET).
pub const ENDPOINT_STATUS: &str = "/status";

// --- Calls ---

/// One call a node can make on a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCall {
    Join { requester: Address },
    StartCalculation { value: i64, algorithm: String },
    TakeToken,
    RequestToken { timestamp: u64, requester: Address },
    ReplyOk { replier: Address },
    PropagateState { op: MathOp, operand: i64 },
    SignOff { departing: Address },
}

impl RpcCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::StartCalculation { .. } => "start_calculation",
            Self::TakeToken => "take_token",
            Self::RequestToken { .. } => "request_token",
            Self::ReplyOk { .. } => "reply_ok",
            Self::PropagateState { .. } => "propagate_state",
            Self::SignOff { .. } => "sign_off",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Join { .. } => ENDPOINT_JOIN,
            Self::StartCalculation { .. } => ENDPOINT_START_CALCULATION,
            Self::TakeToken => ENDPOINT_TAKE_TOKEN,
            Self::RequestToken { .. } => ENDPOINT_REQUEST_TOKEN,
            Self::ReplyOk { .. } => ENDPOINT_REPLY_OK,
            Self::PropagateState { .. } => ENDPOINT_PROPAGATE_STATE,
            Self::SignOff { .. } => ENDPOINT_SIGN_OFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcReply {
    /// Result of `join`: members the requester did not know about.
    Peers(Vec<Address>),
    Ack,
}

impl RpcReply {
    pub fn into_peers(self) -> Vec<Address> {
        match self {
            Self::Peers(peers) => peers,
            Self::Ack => Vec::new(),
        }
    }
}

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub requester: Address,
}

/// Members known to the target, excluding the requester. Empty when the
/// requester was already a member.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub peers: Vec<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartCalculationRequest {
    pub value: i64,
    pub algorithm: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TakeTokenRequest {}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestTokenRequest {
    pub timestamp: u64,
    pub requester: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyOkRequest {
    pub replier: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PropagateStateRequest {
    pub op: MathOp,
    pub operand: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignOffRequest {
    pub departing: Address,
}

/// Acknowledgment for every call except `join`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}
