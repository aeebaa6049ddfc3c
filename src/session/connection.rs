//! Connection handle
//!
//! A [`Connection`] is shared between the session manager (owner), the
//! registry's index sets and the transport tasks. Mutable state sits behind a
//! short synchronous lock that is never held across an await point.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::broadcast::{LiveUpdate, UpdateSink};
use crate::error::DeliveryError;

use super::auth::{AuthClass, Grant, Identity};
use super::state::{Registration, SessionPhase, SessionState};

/// Process-unique connection id
pub type ConnectionId = u64;

/// One live client
pub struct Connection {
    id: ConnectionId,
    sink: Arc<dyn UpdateSink>,
    state: Mutex<SessionState>,
    closed: Notify,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        sink: Arc<dyn UpdateSink>,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            id,
            sink,
            state: Mutex::new(SessionState::new(peer_addr)),
            closed: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn is_live(&self) -> bool {
        self.state.lock().is_live()
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == SessionPhase::Closed
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.state.lock().peer_addr
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.lock().identity().cloned()
    }

    pub fn auth_class(&self) -> Option<AuthClass> {
        self.state.lock().auth_class()
    }

    /// Current series context
    pub fn series(&self) -> Option<String> {
        self.state.lock().series.clone()
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.state.lock().registrations.clone()
    }

    pub fn is_watching(&self, item: &str) -> bool {
        self.state.lock().watch.contains(item)
    }

    /// Watched items, sorted
    pub fn watch_list(&self) -> Vec<String> {
        self.state.lock().watch.iter().cloned().collect()
    }

    pub fn last_activity(&self) -> Instant {
        self.state.lock().last_activity
    }

    pub fn idle_for(&self) -> Duration {
        self.state.lock().idle_for()
    }

    pub fn connected_for(&self) -> Duration {
        self.state.lock().connected_at.elapsed()
    }

    /// Hand an update to this connection's transport
    pub fn deliver(&self, update: Arc<LiveUpdate>) -> Result<(), DeliveryError> {
        self.sink.deliver(update)
    }

    /// Wait until the connection has been torn down
    pub async fn closed(&self) {
        let notified = self.closed.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    pub(crate) fn touch(&self) {
        self.state.lock().touch();
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub(crate) fn on_authenticated(&self, grant: Grant) -> bool {
        self.state.lock().on_authenticated(grant)
    }

    /// Replace the watch set. Returns false if the connection is closed.
    pub(crate) fn set_watch(&self, items: BTreeSet<String>) -> bool {
        let mut state = self.state.lock();
        if state.phase == SessionPhase::Closed {
            return false;
        }
        state.watch = items;
        state.touch();
        true
    }

    /// Add one item. Returns whether the item was newly added.
    pub(crate) fn add_watch(&self, item: String) -> Option<bool> {
        let mut state = self.state.lock();
        if state.phase == SessionPhase::Closed {
            return None;
        }
        state.touch();
        Some(state.watch.insert(item))
    }

    /// Remove one item. Returns whether the item was present.
    pub(crate) fn remove_watch(&self, item: &str) -> Option<bool> {
        let mut state = self.state.lock();
        if state.phase == SessionPhase::Closed {
            return None;
        }
        state.touch();
        Some(state.watch.remove(item))
    }

    /// Transition to `Closed` and wake anything waiting in [`closed`](Self::closed)
    pub(crate) fn close(&self) -> Option<(bool, Vec<Registration>)> {
        let closed = self.state.lock().close();
        if closed.is_some() {
            self.closed.notify_waiters();
        }
        closed
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("phase", &state.phase)
            .field("series", &state.series)
            .field("watch", &state.watch)
            .finish()
    }
}
