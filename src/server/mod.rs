//! WebSocket transport for the live feed
//!
//! Adapts sockets to the session manager: handshake and admission, control
//! message routing, and the per-connection writer that drains update queues.

pub mod config;
mod connection;
pub mod listener;
pub mod protocol;

pub use config::ServerConfig;
pub use listener::LiveServer;
pub use protocol::{encode_update, ClientMessage, ServerMessage};
