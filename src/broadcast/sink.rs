//! Outbound delivery seam
//!
//! The dispatcher never touches a socket. Each connection owns an
//! [`UpdateSink`] that accepts updates without blocking; the transport drains
//! it at its own pace. Implementations must preserve the order of accepted
//! updates.

use std::sync::Arc;

use crate::error::DeliveryError;

use super::update::LiveUpdate;

/// Push-delivery primitive for one connection
pub trait UpdateSink: Send + Sync + 'static {
    /// Hand an update to the transport. Must not block.
    fn deliver(&self, update: Arc<LiveUpdate>) -> Result<(), DeliveryError>;
}

/// Sink that drops everything, for connections that never go live
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn deliver(&self, _update: Arc<LiveUpdate>) -> Result<(), DeliveryError> {
        Ok(())
    }
}
