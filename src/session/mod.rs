//! Connection sessions
//!
//! Every accepted socket becomes a [`Connection`] owned by the
//! [`SessionManager`], which drives it through
//! `Connecting -> Authenticated -> Live -> Closed` and keeps the registry's
//! membership in step with each transition.

pub mod auth;
pub mod config;
pub mod connection;
pub mod manager;
pub mod state;

pub use auth::{AuthClass, AuthRequest, Authenticator, Grant, Identity, StaticAuthenticator};
pub use config::{SessionConfig, MIN_REAP_INTERVAL};
pub use connection::{Connection, ConnectionId};
pub use manager::SessionManager;
pub use state::{Registration, SessionPhase, SessionState};
