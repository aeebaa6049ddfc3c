//! Per-series authorization store
//!
//! Two disjoint connection sets per series, one per authorization class.

use std::collections::HashMap;
use std::sync::Arc;

use crate::session::{AuthClass, Connection, ConnectionId};

/// Set of connections keyed by id
pub type ConnectionSet = HashMap<ConnectionId, Arc<Connection>>;

/// Authorization sets for one series
#[derive(Debug, Default)]
pub struct AuthStore {
    drivers: ConnectionSet,
    series: ConnectionSet,
}

impl AuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set for an authorization class
    pub fn set(&self, class: AuthClass) -> &ConnectionSet {
        match class {
            AuthClass::Driver => &self.drivers,
            AuthClass::Series => &self.series,
        }
    }

    pub(super) fn set_mut(&mut self, class: AuthClass) -> &mut ConnectionSet {
        match class {
            AuthClass::Driver => &mut self.drivers,
            AuthClass::Series => &mut self.series,
        }
    }

    /// Members of both classes
    pub fn all(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.drivers.values().chain(self.series.values())
    }

    pub fn contains(&self, class: AuthClass, id: ConnectionId) -> bool {
        self.set(class).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.drivers.len() + self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty() && self.series.is_empty()
    }
}

/// Counts for one series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesStats {
    pub drivers: usize,
    pub series: usize,
}

impl From<&AuthStore> for SeriesStats {
    fn from(store: &AuthStore) -> Self {
        Self {
            drivers: store.drivers.len(),
            series: store.series.len(),
        }
    }
}
