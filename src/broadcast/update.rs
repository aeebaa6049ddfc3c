//! Update payloads pushed to connections
//!
//! A single [`LiveUpdate`] is shared by every recipient of a publish. The
//! payload is `bytes::Bytes`, so fan-out clones a reference count rather
//! than the data.

use bytes::Bytes;
use serde::Serialize;

/// One change notification as delivered to connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveUpdate {
    /// Series the update belongs to, `None` for cross-series pushes
    pub series: Option<String>,
    /// Item feed the update belongs to, `None` for series-wide notices
    pub item: Option<String>,
    /// Serialized JSON payload
    pub data: Bytes,
}

impl LiveUpdate {
    /// Update for one item within one series
    pub fn targeted(series: impl Into<String>, item: impl Into<String>, data: Bytes) -> Self {
        Self {
            series: Some(series.into()),
            item: Some(item.into()),
            data,
        }
    }

    /// Update for one item regardless of series
    pub fn cross_series(item: impl Into<String>, data: Bytes) -> Self {
        Self {
            series: None,
            item: Some(item.into()),
            data,
        }
    }

    /// Notice for every connection of a series, independent of watch sets
    pub fn series_wide(series: impl Into<String>, data: Bytes) -> Self {
        Self {
            series: Some(series.into()),
            item: None,
            data,
        }
    }

    /// Serialize a value into a payload suitable for [`LiveUpdate::data`]
    pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(value).map(Bytes::from)
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Display for LiveUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            self.series.as_deref().unwrap_or("*"),
            self.item.as_deref().unwrap_or("*")
        )
    }
}
