//! Connection registry and subscription index
//!
//! The registry tracks which connections are live and, per series, which
//! connections of each authorization class receive update notifications.
//! The subscription index answers "who wants item X" on top of it.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<ConnectionRegistry>
//!               ┌────────────────────────────────────┐
//!               │ live:   {id -> Arc<Connection>}    │
//!               │ series: {name -> AuthStore {       │
//!               │            drivers: {id -> conn},  │
//!               │            series:  {id -> conn},  │
//!               │          }}                        │
//!               └─────────────────┬──────────────────┘
//!                                 │
//!          ┌──────────────────────┼──────────────────────┐
//!          │                      │                      │
//!          ▼                      ▼                      ▼
//!   [SessionManager]         [Dispatcher]         [Dispatcher]
//!   register/unregister      watchers_of()       live_watchers_of()
//!   add_live/remove_live     (series + item)     (item, any series)
//! ```
//!
//! Only the session manager mutates membership; everything else reads.
//! Watch sets live on the connections themselves, so a watch change is
//! visible to the next query without touching the registry.

pub mod entry;
pub mod index;
pub mod store;

pub use entry::{AuthStore, ConnectionSet, SeriesStats};
pub use store::ConnectionRegistry;
