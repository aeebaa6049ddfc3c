//! Session state machine
//!
//! Tracks one connection from socket accept to teardown:
//! `Connecting -> Authenticated -> Live -> Closed`. `Closed` is reachable
//! from every phase and is terminal.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::auth::{AuthClass, Grant, Identity};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Socket accepted, identity not yet established
    Connecting,
    /// Identity resolved, not yet in the live set
    Authenticated,
    /// In the live set and registered for its series
    Live,
    /// Torn down
    Closed,
}

/// Per-series registration held by a session
pub type Registration = (String, AuthClass);

/// Mutable state of one session
#[derive(Debug)]
pub struct SessionState {
    /// Current phase
    pub phase: SessionPhase,

    /// Remote peer address, if accepted from a socket
    pub peer_addr: Option<SocketAddr>,

    /// Identity and scope, set on authentication
    pub grant: Option<Grant>,

    /// Current series context (None until authenticated)
    pub series: Option<String>,

    /// Per-series authorization sets this session is a member of
    pub registrations: Vec<Registration>,

    /// Items the client wants pushes for
    pub watch: BTreeSet<String>,

    /// Socket accept time
    pub connected_at: Instant,

    /// Last client activity (any frame, heartbeat included)
    pub last_activity: Instant,
}

impl SessionState {
    pub fn new(peer_addr: Option<SocketAddr>) -> Self {
        let now = Instant::now();
        Self {
            phase: SessionPhase::Connecting,
            peer_addr,
            grant: None,
            series: None,
            registrations: Vec::new(),
            watch: BTreeSet::new(),
            connected_at: now,
            last_activity: now,
        }
    }

    /// Record a successful authentication
    ///
    /// Returns false (and changes nothing) unless the session is `Connecting`.
    pub fn on_authenticated(&mut self, grant: Grant) -> bool {
        if self.phase != SessionPhase::Connecting {
            return false;
        }
        self.series = Some(grant.series.clone());
        self.grant = Some(grant);
        self.phase = SessionPhase::Authenticated;
        true
    }

    /// Enter the live phase, returning the registration to make
    pub fn go_live(&mut self) -> Option<Registration> {
        if self.phase != SessionPhase::Authenticated {
            return None;
        }
        let class = self.grant.as_ref()?.class();
        let series = self.series.clone()?;
        self.phase = SessionPhase::Live;
        self.registrations.push((series.clone(), class));
        Some((series, class))
    }

    /// Close the session, returning the registrations to undo
    ///
    /// Returns `None` if already closed.
    pub fn close(&mut self) -> Option<(bool, Vec<Registration>)> {
        if self.phase == SessionPhase::Closed {
            return None;
        }
        let was_live = self.phase == SessionPhase::Live;
        self.phase = SessionPhase::Closed;
        self.watch.clear();
        Some((was_live, std::mem::take(&mut self.registrations)))
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.grant.as_ref().map(|g| &g.identity)
    }

    pub fn auth_class(&self) -> Option<AuthClass> {
        self.grant.as_ref().map(Grant::class)
    }

    pub fn is_live(&self) -> bool {
        self.phase == SessionPhase::Live
    }

    pub fn is_registered(&self, series: &str, class: AuthClass) -> bool {
        self.registrations
            .iter()
            .any(|(s, c)| s == series && *c == class)
    }
}
