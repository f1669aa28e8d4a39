//! dvap server library
//!
//! Pushes the thread and breakpoint state of a debugged process to WebSocket
//! viewers at a fixed tick, and streams lifecycle notifications over
//! Server-Sent-Events. Debugger integrations either call [`StateStore`]
//! directly or send [`dvap_protocol::DebugEvent`]s through an [`EventSender`].

pub mod accept;
pub mod config;
pub mod events;
pub mod server;
pub mod sse;
pub mod state;
pub mod websocket;

pub use config::{ConfigLoader, EventsConfig, ServerConfig, WebSocketConfig};
pub use events::{event_channel, forward_json_lines, EventPump, EventQueue, EventSender};
pub use server::{Server, ServerControl, ServerHandle, ServerThread};
pub use state::StateStore;
