//! WebSocket push endpoint
//!
//! Hand-rolled RFC 6455 server side: one-shot handshake, then unmasked text
//! frames carrying the rendered state at a fixed tick.

mod broadcast;
mod registry;

pub use broadcast::{run_broadcast_loop, run_tick, TickReport};
pub use registry::{
    BroadcastReport, Connection, ConnectionId, ConnectionRegistry, ConnectionState, Disconnect,
    Transport,
};
