//! Broadcast dispatcher
//!
//! Resolves the target set for a change notification and fans the update out
//! to each connection independently. A failed delivery is logged and the
//! connection is torn down once the batch has been attempted; the publisher
//! only ever sees how many deliveries succeeded.

use std::sync::Arc;

use bytes::Bytes;

use crate::session::{AuthClass, Connection, ConnectionId, SessionManager};

use super::update::LiveUpdate;

/// Fans change notifications out to interested connections
#[derive(Clone)]
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Push to every connection of `series` watching `item`
    ///
    /// Returns the number of connections the update was handed to.
    pub async fn publish(&self, series: &str, item: &str, payload: impl Into<Bytes>) -> usize {
        let targets = self.sessions.registry().watchers_of(series, item).await;
        let update = LiveUpdate::targeted(series, item, payload.into());
        self.fan_out(targets, update).await
    }

    /// Push to every live connection watching `item`, in any series
    pub async fn publish_all(&self, item: &str, payload: impl Into<Bytes>) -> usize {
        let targets = self.sessions.registry().live_watchers_of(item).await;
        let update = LiveUpdate::cross_series(item, payload.into());
        self.fan_out(targets, update).await
    }

    /// Push to one authorization class of `series`, regardless of watch sets
    pub async fn publish_to_class(
        &self,
        series: &str,
        class: AuthClass,
        payload: impl Into<Bytes>,
    ) -> usize {
        let targets = self
            .sessions
            .registry()
            .authorized_connections(series, class)
            .await;
        let update = LiveUpdate::series_wide(series, payload.into());
        self.fan_out(targets, update).await
    }

    /// Push to both authorization classes of `series`, regardless of watch sets
    pub async fn publish_to_series(&self, series: &str, payload: impl Into<Bytes>) -> usize {
        let targets = self
            .sessions
            .registry()
            .all_authorized_connections(series)
            .await;
        let update = LiveUpdate::series_wide(series, payload.into());
        self.fan_out(targets, update).await
    }

    /// Deliver to each target, then tear down the ones that failed
    async fn fan_out(&self, targets: Vec<Arc<Connection>>, update: LiveUpdate) -> usize {
        let update = Arc::new(update);
        let mut delivered = 0usize;
        let mut failed: Vec<ConnectionId> = Vec::new();

        for conn in &targets {
            match conn.deliver(Arc::clone(&update)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        conn_id = conn.id(),
                        update = %update,
                        error = %e,
                        "Delivery failed, scheduling teardown"
                    );
                    failed.push(conn.id());
                }
            }
        }

        tracing::debug!(
            update = %update,
            bytes = update.len(),
            targets = targets.len(),
            delivered = delivered,
            failed = failed.len(),
            "Broadcast update"
        );
        self.sessions
            .stats()
            .published(delivered as u64, failed.len() as u64);

        for id in failed {
            self.sessions.teardown(id).await;
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::broadcast::sink::testing::RecordingSink;
    use crate::session::{AuthRequest, Grant, StaticAuthenticator};

    fn dispatcher() -> Dispatcher {
        let auth = StaticAuthenticator::new()
            .grant("admin-auto21", Grant::series_admin("auto21"))
            .grant("admin-nwr", Grant::series_admin("nwr"))
            .grant("driver", Grant::driver(Uuid::from_u128(5), "auto21"));
        Dispatcher::new(Arc::new(SessionManager::new(auth)))
    }

    async fn admit(
        dispatcher: &Dispatcher,
        token: &str,
        series: &str,
        sink: Arc<RecordingSink>,
    ) -> Arc<Connection> {
        let request = AuthRequest::new(format!("/{}", series)).with_query(format!("token={}", token));
        dispatcher
            .sessions()
            .admit(sink, None, &request)
            .await
            .unwrap()
    }

    fn lap(n: u32) -> Bytes {
        LiveUpdate::encode(&json!({ "lap": n })).unwrap()
    }

    #[tokio::test]
    async fn test_publish_targets_series_and_item() {
        let dispatcher = dispatcher();
        let sink = RecordingSink::new();
        let a = admit(&dispatcher, "admin-auto21", "auto21", Arc::clone(&sink)).await;
        dispatcher.sessions().add_watch(a.id(), "event-42").await.unwrap();

        assert_eq!(dispatcher.publish("auto21", "event-42", lap(1)).await, 1);
        assert_eq!(dispatcher.publish("auto21", "event-43", lap(1)).await, 0);
        assert_eq!(dispatcher.publish("nwr", "event-42", lap(1)).await, 0);

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].series.as_deref(), Some("auto21"));
        assert_eq!(received[0].item.as_deref(), Some("event-42"));
        assert_eq!(sink.payloads(), vec![r#"{"lap":1}"#]);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_abort_batch() {
        let dispatcher = dispatcher();
        let sink_a = RecordingSink::failing();
        let sink_b = RecordingSink::new();
        let a = admit(&dispatcher, "admin-auto21", "auto21", Arc::clone(&sink_a)).await;
        let b = admit(&dispatcher, "driver", "auto21", Arc::clone(&sink_b)).await;
        for conn in [&a, &b] {
            dispatcher.sessions().add_watch(conn.id(), "event-42").await.unwrap();
        }

        let targets = dispatcher
            .sessions()
            .registry()
            .watchers_of("auto21", "event-42")
            .await;
        assert_eq!(targets.len(), 2);

        assert_eq!(dispatcher.publish("auto21", "event-42", lap(1)).await, 1);
        assert_eq!(sink_b.payloads(), vec![r#"{"lap":1}"#]);

        let registry = dispatcher.sessions().registry();
        assert!(!registry.is_live(a.id()).await);
        assert!(a.is_closed());
        assert!(b.is_live());

        let stats = dispatcher.sessions().stats().snapshot();
        assert_eq!(stats.deliveries, 1);
        assert_eq!(stats.delivery_failures, 1);
    }

    #[tokio::test]
    async fn test_per_connection_order() {
        let dispatcher = dispatcher();
        let sink = RecordingSink::new();
        let a = admit(&dispatcher, "driver", "auto21", Arc::clone(&sink)).await;
        dispatcher.sessions().add_watch(a.id(), "event-42").await.unwrap();

        for n in 1..=5 {
            dispatcher.publish("auto21", "event-42", lap(n)).await;
        }

        let laps: Vec<String> = (1..=5).map(|n| format!(r#"{{"lap":{}}}"#, n)).collect();
        assert_eq!(sink.payloads(), laps);
    }

    #[tokio::test]
    async fn test_watch_before_live_has_no_effect() {
        let dispatcher = dispatcher();
        let sessions = dispatcher.sessions();
        let sink = RecordingSink::new();

        let conn = sessions.open(sink.clone(), None).await;
        sessions.add_watch(conn.id(), "event-42").await.unwrap();
        assert_eq!(dispatcher.publish("auto21", "event-42", lap(1)).await, 0);
        assert_eq!(dispatcher.publish_all("event-42", lap(1)).await, 0);

        let request = AuthRequest::new("/auto21").with_query("token=driver");
        sessions.authenticate(conn.id(), &request).await.unwrap();
        assert_eq!(dispatcher.publish("auto21", "event-42", lap(2)).await, 0);

        sessions.go_live(conn.id()).await.unwrap();
        assert_eq!(dispatcher.publish("auto21", "event-42", lap(3)).await, 1);
        assert_eq!(sink.payloads(), vec![r#"{"lap":3}"#]);
    }

    #[tokio::test]
    async fn test_publish_all_crosses_series() {
        let dispatcher = dispatcher();
        let sink_a = RecordingSink::new();
        let sink_b = RecordingSink::new();
        let a = admit(&dispatcher, "admin-auto21", "auto21", Arc::clone(&sink_a)).await;
        let b = admit(&dispatcher, "admin-nwr", "nwr", Arc::clone(&sink_b)).await;
        dispatcher.sessions().add_watch(a.id(), "event-42").await.unwrap();
        dispatcher.sessions().add_watch(b.id(), "event-42").await.unwrap();

        assert_eq!(dispatcher.publish_all("event-42", lap(1)).await, 2);
        assert_eq!(sink_b.received()[0].series, None);
    }

    #[tokio::test]
    async fn test_publish_to_class_ignores_watch() {
        let dispatcher = dispatcher();
        let admin_sink = RecordingSink::new();
        let driver_sink = RecordingSink::new();
        admit(&dispatcher, "admin-auto21", "auto21", Arc::clone(&admin_sink)).await;
        admit(&dispatcher, "driver", "auto21", Arc::clone(&driver_sink)).await;

        let notice = Bytes::from_static(br#"{"announcer":"break"}"#);
        assert_eq!(
            dispatcher
                .publish_to_class("auto21", AuthClass::Series, notice.clone())
                .await,
            1
        );
        assert_eq!(admin_sink.received().len(), 1);
        assert!(driver_sink.received().is_empty());

        assert_eq!(dispatcher.publish_to_series("auto21", notice).await, 2);
        assert_eq!(driver_sink.received()[0].item, None);
    }

    #[tokio::test]
    async fn test_unknown_series_publishes_nowhere() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.publish("ghost", "event-1", lap(1)).await, 0);
        assert_eq!(dispatcher.publish_to_series("ghost", lap(1)).await, 0);
        assert_eq!(dispatcher.sessions().registry().series_count().await, 0);
    }
}
