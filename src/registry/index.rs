//! Subscription index
//!
//! Read-side derivations over the registry: which connections want a given
//! item. Recomputed on every call; there is no cached reverse index.
// TODO: keep an item -> connections map updated on watch changes once series
// routinely carry more than a few hundred watchers.

use std::sync::Arc;

use crate::session::Connection;

use super::store::ConnectionRegistry;

impl ConnectionRegistry {
    /// Members of either authorization set of `series` watching `item`
    pub async fn watchers_of(&self, series: &str, item: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        match inner.series.get(series) {
            Some(store) => store
                .all()
                .filter(|conn| conn.is_watching(item))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Live connections watching `item`, in any series
    pub async fn live_watchers_of(&self, item: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        inner
            .live
            .values()
            .filter(|conn| conn.is_watching(item))
            .cloned()
            .collect()
    }
}
