//! Broadcast behaviour through the public API, without a transport

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use scorekeeper_live::session::StaticAuthenticator;
use scorekeeper_live::{
    AuthClass, AuthRequest, Connection, DeliveryError, Dispatcher, Grant, LiveUpdate,
    SessionManager, SessionPhase, UpdateSink,
};

/// Sink that records payloads, or fails like a broken socket
#[derive(Default)]
struct TestSink {
    payloads: Mutex<Vec<String>>,
    broken: AtomicBool,
}

impl TestSink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn broken() -> Arc<Self> {
        let sink = Self::new();
        sink.broken.store(true, Ordering::SeqCst);
        sink
    }

    fn payloads(&self) -> Vec<String> {
        self.payloads.lock().clone()
    }
}

impl UpdateSink for TestSink {
    fn deliver(&self, update: Arc<LiveUpdate>) -> Result<(), DeliveryError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(DeliveryError::Closed);
        }
        self.payloads
            .lock()
            .push(String::from_utf8_lossy(&update.data).into_owned());
        Ok(())
    }
}

fn dispatcher() -> Dispatcher {
    let auth = StaticAuthenticator::new()
        .grant("auto21-admin", Grant::series_admin("auto21"))
        .grant("driver-a", Grant::driver(Uuid::from_u128(1), "auto21"))
        .grant("driver-b", Grant::driver(Uuid::from_u128(2), "auto21"));
    Dispatcher::new(Arc::new(SessionManager::new(auth)))
}

async fn admit(dispatcher: &Dispatcher, token: &str, sink: Arc<TestSink>) -> Arc<Connection> {
    let request = AuthRequest::new("/auto21").with_query(format!("token={}", token));
    dispatcher
        .sessions()
        .admit(sink, None, &request)
        .await
        .unwrap()
}

fn lap(n: u32) -> bytes::Bytes {
    LiveUpdate::encode(&json!({ "lap": n })).unwrap()
}

#[tokio::test]
async fn series_admin_receives_only_watched_item() {
    let dispatcher = dispatcher();
    let sink = TestSink::new();
    let a = admit(&dispatcher, "auto21-admin", Arc::clone(&sink)).await;
    assert_eq!(a.phase(), SessionPhase::Live);

    dispatcher.sessions().add_watch(a.id(), "event-42").await.unwrap();

    assert_eq!(dispatcher.publish("auto21", "event-42", lap(1)).await, 1);
    assert_eq!(dispatcher.publish("auto21", "event-43", lap(1)).await, 0);
    assert_eq!(sink.payloads(), vec![r#"{"lap":1}"#]);
}

#[tokio::test]
async fn broken_connection_does_not_stop_siblings() {
    let dispatcher = dispatcher();
    let sink_a = TestSink::broken();
    let sink_b = TestSink::new();
    let a = admit(&dispatcher, "driver-a", Arc::clone(&sink_a)).await;
    let b = admit(&dispatcher, "driver-b", Arc::clone(&sink_b)).await;

    let sessions = dispatcher.sessions();
    sessions.add_watch(a.id(), "event-42").await.unwrap();
    sessions.add_watch(b.id(), "event-42").await.unwrap();

    dispatcher.publish("auto21", "event-42", lap(1)).await;

    assert_eq!(sink_b.payloads(), vec![r#"{"lap":1}"#]);
    let registry = sessions.registry();
    assert!(!registry.is_live(a.id()).await);
    assert!(registry.is_live(b.id()).await);
    assert_eq!(a.phase(), SessionPhase::Closed);
}

#[tokio::test]
async fn publish_reaches_exactly_the_watchers() {
    let dispatcher = dispatcher();
    let sessions = dispatcher.sessions();
    let sinks: Vec<Arc<TestSink>> = (0..3).map(|_| TestSink::new()).collect();
    let tokens = ["auto21-admin", "driver-a", "driver-b"];

    let mut conns = Vec::new();
    for (token, sink) in tokens.iter().zip(&sinks) {
        conns.push(admit(&dispatcher, token, Arc::clone(sink)).await);
    }
    sessions.add_watch(conns[0].id(), "event-42").await.unwrap();
    sessions.add_watch(conns[2].id(), "event-42").await.unwrap();

    let mut expected: Vec<_> = sessions
        .registry()
        .watchers_of("auto21", "event-42")
        .await
        .iter()
        .map(|c| c.id())
        .collect();
    expected.sort();

    dispatcher.publish("auto21", "event-42", lap(7)).await;

    let mut reached: Vec<_> = conns
        .iter()
        .zip(&sinks)
        .filter(|(_, sink)| !sink.payloads().is_empty())
        .map(|(conn, _)| conn.id())
        .collect();
    reached.sort();
    assert_eq!(reached, expected);
}

#[tokio::test]
async fn live_connections_are_in_their_series_sets() {
    let dispatcher = dispatcher();
    let sessions = dispatcher.sessions();
    let admin = admit(&dispatcher, "auto21-admin", TestSink::new()).await;
    let driver = admit(&dispatcher, "driver-a", TestSink::new()).await;

    let registry = sessions.registry();
    for conn in registry.live_connections().await {
        let series = conn.series().unwrap();
        let members = registry.all_authorized_connections(&series).await;
        assert!(members.iter().any(|m| m.id() == conn.id()));
    }
    assert!(registry.is_authorized("auto21", AuthClass::Series, admin.id()).await);
    assert!(registry.is_authorized("auto21", AuthClass::Driver, driver.id()).await);
}

#[tokio::test]
async fn teardown_twice_matches_teardown_once() {
    let dispatcher = dispatcher();
    let sessions = dispatcher.sessions();
    let a = admit(&dispatcher, "driver-a", TestSink::new()).await;

    assert!(sessions.teardown(a.id()).await);
    let after_once = (
        sessions.registry().live_count().await,
        sessions.registry().series_stats("auto21").await,
        sessions.session_count().await,
    );

    assert!(!sessions.teardown(a.id()).await);
    let after_twice = (
        sessions.registry().live_count().await,
        sessions.registry().series_stats("auto21").await,
        sessions.session_count().await,
    );
    assert_eq!(after_once, after_twice);
}
