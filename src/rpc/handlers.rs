use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use super::dispatch::dispatch;
use super::protocol::*;
use crate::error::{ClusterError, ClusterResult};
use crate::node::service::{Node, NodeStatus};

/// Router serving every RPC endpoint for `node`.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route(ENDPOINT_JOIN, post(handle_join))
        .route(ENDPOINT_START_CALCULATION, post(handle_start_calculation))
        .route(ENDPOINT_TAKE_TOKEN, post(handle_take_token))
        .route(ENDPOINT_REQUEST_TOKEN, post(handle_request_token))
        .route(ENDPOINT_REPLY_OK, post(handle_reply_ok))
        .route(ENDPOINT_PROPAGATE_STATE, post(handle_propagate_state))
        .route(ENDPOINT_SIGN_OFF, post(handle_sign_off))
        .route(ENDPOINT_STATUS, get(handle_status))
        .layer(Extension(node))
}

fn ack(result: ClusterResult<RpcReply>) -> (StatusCode, Json<AckResponse>) {
    match result {
        Ok(_) => (StatusCode::OK, Json(AckResponse::ok())),
        Err(e @ ClusterError::ProtocolMisuse { .. }) => {
            tracing::warn!("Rejected call: {}", e);
            (StatusCode::CONFLICT, Json(AckResponse::failed(e)))
        }
        Err(e) => {
            tracing::error!("Call failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AckResponse::failed(e)),
            )
        }
    }
}

pub async fn handle_join(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<JoinRequest>,
) -> (StatusCode, Json<JoinResponse>) {
    match dispatch(&node, RpcCall::Join { requester: req.requester }).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(JoinResponse {
                peers: reply.into_peers(),
            }),
        ),
        Err(e) => {
            tracing::error!("Join failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(JoinResponse { peers: Vec::new() }),
            )
        }
    }
}

pub async fn handle_start_calculation(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<StartCalculationRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let call = RpcCall::StartCalculation {
        value: req.value,
        algorithm: req.algorithm,
    };
    ack(dispatch(&node, call).await)
}

pub async fn handle_take_token(
    Extension(node): Extension<Arc<Node>>,
    Json(_): Json<TakeTokenRequest>,
) -> (StatusCode, Json<AckResponse>) {
    ack(dispatch(&node, RpcCall::TakeToken).await)
}

pub async fn handle_request_token(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<RequestTokenRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let call = RpcCall::RequestToken {
        timestamp: req.timestamp,
        requester: req.requester,
    };
    ack(dispatch(&node, call).await)
}

pub async fn handle_reply_ok(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<ReplyOkRequest>,
) -> (StatusCode, Json<AckResponse>) {
    ack(dispatch(&node, RpcCall::ReplyOk { replier: req.replier }).await)
}

pub async fn handle_propagate_state(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<PropagateStateRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let call = RpcCall::PropagateState {
        op: req.op,
        operand: req.operand,
    };
    ack(dispatch(&node, call).await)
}

pub async fn handle_sign_off(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<SignOffRequest>,
) -> (StatusCode, Json<AckResponse>) {
    ack(dispatch(&node, RpcCall::SignOff { departing: req.departing }).await)
}

pub async fn handle_status(Extension(node): Extension<Arc<Node>>) -> Json<NodeStatus> {
    Json(node.status().await)
}
