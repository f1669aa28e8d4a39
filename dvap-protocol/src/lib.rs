//! dvap-protocol: Wire definitions for the dvap push server
//!
//! This crate defines the server side of the WebSocket protocol used to
//! stream debugger state to viewers (opening handshake and text framing),
//! the thread/breakpoint records and their line-oriented rendering, the
//! typed debugger events accepted from producers, and the JSON-RPC
//! notifications emitted on the event stream.

pub mod codec;
pub mod handshake;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{encode_text_frame, FrameCodec, FrameError};
pub use handshake::{accept_key, respond, HandshakeError, HandshakeResponse, WEBSOCKET_GUID};
pub use messages::{Notification, NotificationMethod, JSONRPC_VERSION};
pub use types::{
    BreakpointChange, BreakpointInfo, BreakpointKind, DebugEvent, StateSnapshot, StopReason,
    ThreadInfo, ThreadLocation,
};
