use super::protocol::{RpcCall, RpcReply};
use crate::error::ClusterResult;
use crate::node::service::Node;

/// Applies an inbound call to `node`.
pub async fn dispatch(node: &Node, call: RpcCall) -> ClusterResult<RpcReply> {
    tracing::debug!("<- {} on {}", call.method(), node.address);

    match call {
        RpcCall::Join { requester } => Ok(RpcReply::Peers(node.handle_join(requester).await)),
        RpcCall::StartCalculation { value, algorithm } => {
            node.handle_start_calculation(value, &algorithm).await;
            Ok(RpcReply::Ack)
        }
        RpcCall::TakeToken => {
            node.handle_take_token().await?;
            Ok(RpcReply::Ack)
        }
        RpcCall::RequestToken {
            timestamp,
            requester,
        } => {
            node.handle_request_token(timestamp, requester).await?;
            Ok(RpcReply::Ack)
        }
        RpcCall::ReplyOk { replier } => {
            node.handle_reply_ok(replier).await?;
            Ok(RpcReply::Ack)
        }
        RpcCall::PropagateState { op, operand } => {
            node.handle_propagate_state(op, operand).await;
            Ok(RpcReply::Ack)
        }
        RpcCall::SignOff { departing } => {
            node.handle_sign_off(departing).await;
            Ok(RpcReply::Ack)
        }
    }
}
