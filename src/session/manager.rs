//! Session lifecycle manager
//!
//! Owns every connection from accept to teardown and is the only writer of
//! registry membership. Lock order is always registry first, then the
//! connection's own state, which keeps `go_live` and `teardown` from racing a
//! closed connection back into the registry.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::broadcast::UpdateSink;
use crate::error::{AuthError, Error, Result};
use crate::registry::ConnectionRegistry;
use crate::stats::LiveStats;

use super::auth::{AuthClass, AuthRequest, Authenticator, Grant, Identity};
use super::config::{SessionConfig, MIN_REAP_INTERVAL};
use super::connection::{Connection, ConnectionId};
use super::state::SessionPhase;

/// Admission, watch-list routing, heartbeat and teardown for connections
pub struct SessionManager {
    config: SessionConfig,
    registry: Arc<ConnectionRegistry>,
    authenticator: Arc<dyn Authenticator>,
    sessions: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
    stats: Arc<LiveStats>,
}

impl SessionManager {
    /// Create a manager with default configuration and a fresh registry
    pub fn new(authenticator: impl Authenticator) -> Self {
        Self::with_config(SessionConfig::default(), authenticator)
    }

    /// Create a manager with custom configuration and a fresh registry
    pub fn with_config(config: SessionConfig, authenticator: impl Authenticator) -> Self {
        Self::with_parts(
            config,
            Arc::new(ConnectionRegistry::new()),
            Arc::new(authenticator),
            Arc::new(LiveStats::new()),
        )
    }

    /// Create a manager over an existing registry and stats block
    pub fn with_parts(
        config: SessionConfig,
        registry: Arc<ConnectionRegistry>,
        authenticator: Arc<dyn Authenticator>,
        stats: Arc<LiveStats>,
    ) -> Self {
        Self {
            config,
            registry,
            authenticator,
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<LiveStats> {
        &self.stats
    }

    /// Start tracking an accepted socket (`Connecting`)
    pub async fn open(
        &self,
        sink: Arc<dyn UpdateSink>,
        peer_addr: Option<SocketAddr>,
    ) -> Arc<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection::new(id, sink, peer_addr));

        self.sessions.write().await.insert(id, Arc::clone(&conn));
        self.stats.connection_opened();

        tracing::debug!(conn_id = id, peer = ?peer_addr, "Connection opened");
        conn
    }

    /// Look up a session by id (any phase except torn down)
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Number of tracked sessions, in any phase
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn require(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        self.get(id).await.ok_or(Error::UnknownConnection(id))
    }

    /// Resolve identity through the authenticator (`Connecting -> Authenticated`)
    ///
    /// A rejection tears the connection down before returning; it never
    /// reaches the registry.
    pub async fn authenticate(&self, id: ConnectionId, request: &AuthRequest) -> Result<Grant> {
        let conn = self.require(id).await?;
        let phase = conn.phase();
        if phase != SessionPhase::Connecting {
            return Err(Error::InvalidTransition {
                id,
                phase,
                action: "authenticate",
            });
        }

        match self.authenticator.authenticate(request).await {
            Ok(grant) => {
                if !conn.on_authenticated(grant.clone()) {
                    return Err(Error::InvalidTransition {
                        id,
                        phase: conn.phase(),
                        action: "authenticate",
                    });
                }
                tracing::info!(
                    conn_id = id,
                    identity = %grant.identity,
                    series = %grant.series,
                    "Connection authenticated"
                );
                Ok(grant)
            }
            Err(e) => {
                tracing::warn!(conn_id = id, error = %e, path = %request.path, "Authentication failed");
                self.stats.auth_failed();
                self.teardown(id).await;
                Err(Error::Unauthorized(e))
            }
        }
    }

    /// Add to the live set and the series authorization set (`Authenticated -> Live`)
    pub async fn go_live(&self, id: ConnectionId) -> Result<()> {
        let conn = self.require(id).await?;

        let mut registry = self.registry.write().await;
        let Some((series, class)) = conn.with_state(|state| state.go_live()) else {
            return Err(Error::InvalidTransition {
                id,
                phase: conn.phase(),
                action: "go live",
            });
        };
        registry.add_live(&conn);
        registry.register(&series, class, &conn);
        drop(registry);

        tracing::info!(conn_id = id, series = %series, class = %class, "Connection live");
        Ok(())
    }

    /// Open, authenticate and go live in one step
    pub async fn admit(
        &self,
        sink: Arc<dyn UpdateSink>,
        peer_addr: Option<SocketAddr>,
        request: &AuthRequest,
    ) -> Result<Arc<Connection>> {
        let conn = self.open(sink, peer_addr).await;
        self.authenticate(conn.id(), request).await?;
        if let Err(e) = self.go_live(conn.id()).await {
            self.teardown(conn.id()).await;
            return Err(e);
        }
        Ok(conn)
    }

    /// Start watching an item. Returns whether it was newly added.
    pub async fn add_watch(&self, id: ConnectionId, item: impl Into<String>) -> Result<bool> {
        let conn = self.require(id).await?;
        let item = item.into();
        let added = conn.add_watch(item.clone()).ok_or(Error::UnknownConnection(id))?;
        tracing::debug!(conn_id = id, item = %item, added = added, "Watch added");
        Ok(added)
    }

    /// Stop watching an item. Returns whether it was being watched.
    pub async fn remove_watch(&self, id: ConnectionId, item: &str) -> Result<bool> {
        let conn = self.require(id).await?;
        let removed = conn.remove_watch(item).ok_or(Error::UnknownConnection(id))?;
        tracing::debug!(conn_id = id, item = %item, removed = removed, "Watch removed");
        Ok(removed)
    }

    /// Replace the watch set
    pub async fn set_watch<I, S>(&self, id: ConnectionId, items: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let conn = self.require(id).await?;
        let items: BTreeSet<String> = items.into_iter().map(Into::into).collect();
        let count = items.len();
        if !conn.set_watch(items) {
            return Err(Error::UnknownConnection(id));
        }
        tracing::debug!(conn_id = id, items = count, "Watch set replaced");
        Ok(())
    }

    /// Heartbeat: record client activity
    pub async fn touch(&self, id: ConnectionId) -> Result<()> {
        self.require(id).await?.touch();
        Ok(())
    }

    /// Register a live connection for updates in another series
    ///
    /// Series administrators may only subscribe within their own series.
    /// Unless multi-series subscriptions are allowed, the connection's
    /// existing registrations in other series are dropped.
    pub async fn subscribe_updates(&self, id: ConnectionId, series: &str) -> Result<()> {
        let conn = self.require(id).await?;

        let mut registry = self.registry.write().await;
        let outcome = conn.with_state(|state| {
            if !state.is_live() {
                return Err(Error::InvalidTransition {
                    id,
                    phase: state.phase,
                    action: "subscribe",
                });
            }
            if let Some(Identity::SeriesAdmin(own)) = state.identity() {
                if own != series {
                    return Err(Error::Unauthorized(AuthError::SeriesDenied(
                        series.to_string(),
                    )));
                }
            }
            let class = state.auth_class().ok_or(Error::InvalidTransition {
                id,
                phase: state.phase,
                action: "subscribe",
            })?;

            let mut dropped = Vec::new();
            if !self.config.allow_multi_series {
                state.registrations.retain(|reg| {
                    let keep = reg.0 == series;
                    if !keep {
                        dropped.push(reg.clone());
                    }
                    keep
                });
            }
            if !state.is_registered(series, class) {
                state.registrations.push((series.to_string(), class));
            }
            state.series = Some(series.to_string());
            Ok((class, dropped))
        });
        let (class, dropped) = outcome?;

        for (old, old_class) in &dropped {
            registry.unregister(old, *old_class, id);
        }
        registry.register(series, class, &conn);
        drop(registry);

        tracing::debug!(
            conn_id = id,
            series = %series,
            class = %class,
            replaced = dropped.len(),
            "Subscribed to series updates"
        );
        Ok(())
    }

    /// Drop a connection's registrations for a series
    ///
    /// Returns whether anything was removed.
    pub async fn unsubscribe_updates(&self, id: ConnectionId, series: &str) -> Result<bool> {
        let conn = self.require(id).await?;

        let mut registry = self.registry.write().await;
        let removed: Vec<(String, AuthClass)> = conn.with_state(|state| {
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.registrations)
                .into_iter()
                .partition(|reg| reg.0 == series);
            state.registrations = kept;
            if state.series.as_deref() == Some(series) {
                state.series = state.registrations.first().map(|reg| reg.0.clone());
            }
            removed
        });
        for (old, class) in &removed {
            registry.unregister(old, *class, id);
        }
        drop(registry);

        if !removed.is_empty() {
            tracing::debug!(conn_id = id, series = %series, "Unsubscribed from series updates");
        }
        Ok(!removed.is_empty())
    }

    /// Tear a connection down (any phase -> `Closed`)
    ///
    /// Removes it from the live set and every authorization set it joined.
    /// Returns false if the connection was unknown or already closed.
    pub async fn teardown(&self, id: ConnectionId) -> bool {
        let Some(conn) = self.sessions.write().await.remove(&id) else {
            return false;
        };
        let Some((was_live, registrations)) = conn.close() else {
            return false;
        };

        {
            let mut registry = self.registry.write().await;
            registry.remove_live(id);
            for (series, class) in &registrations {
                registry.unregister(series, *class, id);
            }
        }
        self.stats.connection_closed();

        tracing::info!(
            conn_id = id,
            was_live = was_live,
            registrations = registrations.len(),
            duration_secs = conn.connected_for().as_secs(),
            "Connection closed"
        );
        true
    }

    /// Tear down every connection idle longer than the configured timeout
    ///
    /// Also prunes empty series stores when configured to.
    pub async fn reap_stale(&self) -> usize {
        let stale: Vec<ConnectionId> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|conn| conn.idle_for() > self.config.idle_timeout)
            .map(|conn| conn.id())
            .collect();

        let mut reaped = 0;
        for id in stale {
            if self.teardown(id).await {
                tracing::info!(conn_id = id, "Stale connection reaped");
                reaped += 1;
            }
        }
        if reaped > 0 {
            self.stats.reaped(reaped as u64);
        }

        if self.config.evict_empty_series {
            self.registry.prune_empty_series().await;
        }

        reaped
    }

    /// Spawn background heartbeat reaper
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let sessions = Arc::clone(self);
        let interval = sessions.config.reap_interval.max(MIN_REAP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sessions.reap_stale().await;
            }
        })
    }

    /// Tear down every connection
    pub async fn shutdown(&self) -> usize {
        let ids: Vec<ConnectionId> = self.sessions.read().await.keys().copied().collect();
        let mut closed = 0;
        for id in ids {
            if self.teardown(id).await {
                closed += 1;
            }
        }
        tracing::info!(closed = closed, "Session manager shut down");
        closed
    }
}
