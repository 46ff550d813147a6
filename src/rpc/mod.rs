//! RPC Module
//!
//! The call surface nodes expose to each other: `join`, `start_calculation`, `take_token`,
//! `request_token`, `reply_ok`, `propagate_state` and `sign_off`.
//!
//! ## Submodules
//! - **`protocol`**: Endpoint constants, the `RpcCall`/`RpcReply` vocabulary and wire DTOs.
//! - **`transport`**: The `PeerTransport` seam the node and engines send through.
//! - **`http`**: `PeerTransport` over HTTP/JSON with reqwest.
//! - **`local`**: In-process network used for simulations and tests.
//! - **`dispatch`**: Single inbound entry point mapping a call onto node/engine effects.
//! - **`handlers`**: axum handlers and router serving the endpoints.

pub mod dispatch;
pub mod handlers;
pub mod http;
pub mod local;
pub mod protocol;
pub mod transport;
