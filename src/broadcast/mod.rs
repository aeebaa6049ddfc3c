//! Update broadcasting
//!
//! [`Dispatcher`] turns a change notification into per-connection deliveries.
//! Each [`Connection`](crate::session::Connection) owns an [`UpdateSink`]; a
//! publish resolves its targets through the registry's subscription index and
//! hands each sink a shared `Arc<LiveUpdate>`.
//!
//! ```text
//!   event source ──► Dispatcher::publish(series, item, payload)
//!                          │
//!                          ├─► registry.watchers_of(series, item)
//!                          │
//!                          ├─► conn.deliver(update)  (per target, non-blocking)
//!                          │        └─► sink queue ──► writer task ──► socket
//!                          │
//!                          └─► sessions.teardown(failed targets)
//! ```

pub mod dispatcher;
pub mod sink;
pub mod update;

pub use dispatcher::Dispatcher;
pub use sink::{NullSink, UpdateSink};
pub use update::LiveUpdate;
