//! Connection registry implementation
//!
//! Holds the live set and the per-series authorization stores behind one
//! `RwLock`, so every query sees a consistent view of both.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::session::{AuthClass, Connection, ConnectionId};

use super::entry::{AuthStore, ConnectionSet, SeriesStats};

/// Registry contents, mutated only through a write guard
#[derive(Debug, Default)]
pub(crate) struct RegistryInner {
    pub(super) series: HashMap<String, AuthStore>,
    pub(super) live: ConnectionSet,
}

impl RegistryInner {
    /// Get-or-insert-default on the per-series store
    fn store_or_default(&mut self, series: &str) -> &mut AuthStore {
        self.series.entry(series.to_string()).or_default()
    }

    /// Returns true if the connection was not already a member
    pub(crate) fn register(
        &mut self,
        series: &str,
        class: AuthClass,
        conn: &Arc<Connection>,
    ) -> bool {
        self.store_or_default(series)
            .set_mut(class)
            .insert(conn.id(), Arc::clone(conn))
            .is_none()
    }

    /// Returns true if the connection was a member
    pub(crate) fn unregister(&mut self, series: &str, class: AuthClass, id: ConnectionId) -> bool {
        self.series
            .get_mut(series)
            .map(|store| store.set_mut(class).remove(&id).is_some())
            .unwrap_or(false)
    }

    pub(crate) fn add_live(&mut self, conn: &Arc<Connection>) -> bool {
        self.live.insert(conn.id(), Arc::clone(conn)).is_none()
    }

    pub(crate) fn remove_live(&mut self, id: ConnectionId) -> bool {
        self.live.remove(&id).is_some()
    }

    fn prune_empty_series(&mut self) -> usize {
        let before = self.series.len();
        self.series.retain(|_, store| !store.is_empty());
        before - self.series.len()
    }
}

/// Registry of live connections and per-series update subscribers
///
/// Constructed by the server (or directly in tests) and shared via `Arc`;
/// there is no global instance. Unknown series resolve to empty results and
/// reads never create entries.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    pub(super) inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for a compound mutation
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().await
    }

    #[cfg(test)]
    /// Add a connection to a series' authorization set (idempotent)
    pub(crate) async fn register(&self, series: &str, class: AuthClass, conn: &Arc<Connection>) {
        let added = self.write().await.register(series, class, conn);
        if added {
            tracing::debug!(conn_id = conn.id(), series = %series, class = %class, "Registered for updates");
        }
    }

    #[cfg(test)]
    /// Remove a connection from a series' authorization set (no-op if absent)
    pub(crate) async fn unregister(&self, series: &str, class: AuthClass, id: ConnectionId) {
        let removed = self.write().await.unregister(series, class, id);
        if removed {
            tracing::debug!(conn_id = id, series = %series, class = %class, "Unregistered from updates");
        }
    }

    #[cfg(test)]
    pub(crate) async fn add_live(&self, conn: &Arc<Connection>) {
        self.write().await.add_live(conn);
    }

    #[cfg(test)]
    pub(crate) async fn remove_live(&self, id: ConnectionId) {
        self.write().await.remove_live(id);
    }

    /// Members of one authorization set
    ///
    /// The returned list is a snapshot taken under the read lock.
    pub async fn authorized_connections(
        &self,
        series: &str,
        class: AuthClass,
    ) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        inner
            .series
            .get(series)
            .map(|store| store.set(class).values().cloned().collect())
            .unwrap_or_default()
    }

    /// Members of both authorization sets of a series
    pub async fn all_authorized_connections(&self, series: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        inner
            .series
            .get(series)
            .map(|store| store.all().cloned().collect())
            .unwrap_or_default()
    }

    /// Every connection in the live set
    pub async fn live_connections(&self) -> Vec<Arc<Connection>> {
        self.inner.read().await.live.values().cloned().collect()
    }

    pub async fn is_live(&self, id: ConnectionId) -> bool {
        self.inner.read().await.live.contains_key(&id)
    }

    pub async fn is_authorized(&self, series: &str, class: AuthClass, id: ConnectionId) -> bool {
        let inner = self.inner.read().await;
        inner
            .series
            .get(series)
            .map(|store| store.contains(class, id))
            .unwrap_or(false)
    }

    pub async fn live_count(&self) -> usize {
        self.inner.read().await.live.len()
    }

    /// Number of per-series stores, empty ones included
    pub async fn series_count(&self) -> usize {
        self.inner.read().await.series.len()
    }

    pub async fn series_stats(&self, series: &str) -> SeriesStats {
        let inner = self.inner.read().await;
        inner
            .series
            .get(series)
            .map(SeriesStats::from)
            .unwrap_or_default()
    }

    /// Drop per-series stores with no members
    pub async fn prune_empty_series(&self) -> usize {
        let pruned = self.write().await.prune_empty_series();
        if pruned > 0 {
            tracing::debug!(pruned = pruned, "Pruned empty series stores");
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NullSink;

    fn conn(id: ConnectionId) -> Arc<Connection> {
        Arc::new(Connection::new(id, Arc::new(NullSink), None))
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = ConnectionRegistry::new();
        let a = conn(1);

        registry.register("auto21", AuthClass::Series, &a).await;
        registry.register("auto21", AuthClass::Series, &a).await;
        assert_eq!(
            registry
                .authorized_connections("auto21", AuthClass::Series)
                .await
                .len(),
            1
        );
        assert!(registry
            .authorized_connections("auto21", AuthClass::Driver)
            .await
            .is_empty());

        registry.unregister("auto21", AuthClass::Series, 1).await;
        assert!(!registry.is_authorized("auto21", AuthClass::Series, 1).await);

        // Absent member and unknown series are both no-ops
        registry.unregister("auto21", AuthClass::Series, 1).await;
        registry.unregister("nope", AuthClass::Driver, 9).await;
    }

    #[tokio::test]
    async fn test_all_authorized_is_union() {
        let registry = ConnectionRegistry::new();
        let (a, b, c) = (conn(1), conn(2), conn(3));

        registry.register("auto21", AuthClass::Driver, &a).await;
        registry.register("auto21", AuthClass::Series, &b).await;
        registry.register("nwr", AuthClass::Series, &c).await;

        let mut ids: Vec<_> = registry
            .all_authorized_connections("auto21")
            .await
            .iter()
            .map(|c| c.id())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(
            registry.series_stats("auto21").await,
            SeriesStats {
                drivers: 1,
                series: 1
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_series_is_empty_and_not_created() {
        let registry = ConnectionRegistry::new();

        assert!(registry.all_authorized_connections("ghost").await.is_empty());
        assert!(registry
            .authorized_connections("ghost", AuthClass::Driver)
            .await
            .is_empty());
        assert_eq!(registry.series_stats("ghost").await, SeriesStats::default());
        assert_eq!(registry.series_count().await, 0);
    }

    #[tokio::test]
    async fn test_live_set() {
        let registry = ConnectionRegistry::new();
        let a = conn(1);

        registry.add_live(&a).await;
        registry.add_live(&a).await;
        assert_eq!(registry.live_count().await, 1);
        assert!(registry.is_live(1).await);

        registry.remove_live(1).await;
        registry.remove_live(1).await;
        assert_eq!(registry.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_prune_empty_series() {
        let registry = ConnectionRegistry::new();
        let a = conn(1);

        registry.register("auto21", AuthClass::Driver, &a).await;
        registry.register("nwr", AuthClass::Driver, &a).await;
        registry.unregister("nwr", AuthClass::Driver, 1).await;
        assert_eq!(registry.series_count().await, 2);

        assert_eq!(registry.prune_empty_series().await, 1);
        assert_eq!(registry.series_count().await, 1);
        assert!(registry.is_authorized("auto21", AuthClass::Driver, 1).await);
    }
}
