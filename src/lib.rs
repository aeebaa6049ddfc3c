//! Live results broadcast core
//!
//! Tracks which connected clients may watch which series and items, and
//! pushes live updates (car runs, announcer notices, data-entry changes) to
//! exactly the connections that want them.
//!
//! # Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`registry`] | Live set and per-series authorization sets; subscription index |
//! | [`session`] | Connection lifecycle: admission, watch lists, heartbeat, teardown |
//! | [`broadcast`] | Dispatcher fanning updates out to per-connection sinks |
//! | [`server`] | WebSocket transport over `tokio-tungstenite` |
//! | [`stats`] | Connection and delivery counters |
//!
//! # Example
//!
//! ```no_run
//! use scorekeeper_live::server::{LiveServer, ServerConfig};
//! use scorekeeper_live::session::{Grant, StaticAuthenticator};
//!
//! # async fn example() -> scorekeeper_live::error::Result<()> {
//! let auth = StaticAuthenticator::new().grant("secret", Grant::series_admin("auto21"));
//! let server = LiveServer::new(ServerConfig::default(), auth);
//!
//! let dispatcher = server.dispatcher().clone();
//! tokio::spawn(async move {
//!     dispatcher.publish("auto21", "event-42", r#"{"lap":1}"#).await;
//! });
//!
//! server.run().await
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use broadcast::{Dispatcher, LiveUpdate, UpdateSink};
pub use error::{AuthError, DeliveryError, Error, Result};
pub use registry::ConnectionRegistry;
pub use server::{LiveServer, ServerConfig};
pub use session::{
    AuthClass, AuthRequest, Authenticator, Connection, ConnectionId, Grant, Identity,
    SessionConfig, SessionManager, SessionPhase,
};
