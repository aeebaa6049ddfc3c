//! Per-socket handling
//!
//! Each accepted socket gets a WebSocket handshake (capturing what the
//! authenticator needs), admission through the session manager, then two
//! halves: a reader loop routing control messages and a writer task
//! draining the connection's outbound queue. Either half stops as soon as the
//! connection is torn down, whoever initiated it.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::broadcast::{LiveUpdate, UpdateSink};
use crate::error::{DeliveryError, Error, Result};
use crate::session::{AuthRequest, Connection, SessionManager, SessionPhase};

use super::config::ServerConfig;
use super::protocol::{encode_update, ClientMessage, ServerMessage};

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsReader = SplitStream<WebSocketStream<TcpStream>>;

/// Item on a connection's outbound queue
#[derive(Debug)]
pub(crate) enum Outbound {
    Update(Arc<LiveUpdate>),
    Reply(ServerMessage),
}

/// [`UpdateSink`] feeding a connection's writer task
#[derive(Debug, Clone)]
pub(crate) struct ChannelSink {
    tx: mpsc::Sender<Outbound>,
}

impl UpdateSink for ChannelSink {
    fn deliver(&self, update: Arc<LiveUpdate>) -> std::result::Result<(), DeliveryError> {
        self.tx
            .try_send(Outbound::Update(update))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::Full,
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

/// Drive one socket from handshake to close
pub(crate) async fn serve_socket(
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    sessions: Arc<SessionManager>,
) -> Result<()> {
    let mut request = AuthRequest {
        peer_addr: Some(peer_addr),
        ..Default::default()
    };
    let capture = |req: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        request.path = req.uri().path().to_string();
        request.query = req.uri().query().map(str::to_string);
        request.cookie = req
            .headers()
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(response)
    };
    let ws = tokio::time::timeout(
        config.handshake_timeout,
        tokio_tungstenite::accept_hdr_async(socket, capture),
    )
    .await
    .map_err(|_| Error::HandshakeTimeout)??;

    let (mut write, read) = ws.split();
    let (tx, rx) = mpsc::channel(config.outbound_capacity);
    let sink = Arc::new(ChannelSink { tx: tx.clone() });

    let conn = match admit_socket(&sessions, sink, &tx, Some(peer_addr), &request).await {
        Ok(conn) => conn,
        Err(e) => {
            if let Ok(reply) = ServerMessage::error(&e).encode() {
                let _ = write.send(Message::text(reply)).await;
            }
            let _ = write.close().await;
            return Err(e);
        }
    };

    let writer = tokio::spawn(write_loop(write, rx, Arc::clone(&conn)));
    let result = read_loop(read, &conn, &sessions, &tx).await;

    sessions.teardown(conn.id()).await;
    drop(tx);
    let _ = writer.await;

    result
}

/// Authenticate, queue the welcome, then go live
///
/// The welcome is queued before the connection joins any set, so it is
/// always the first frame the client sees.
async fn admit_socket(
    sessions: &SessionManager,
    sink: Arc<ChannelSink>,
    tx: &mpsc::Sender<Outbound>,
    peer_addr: Option<SocketAddr>,
    request: &AuthRequest,
) -> Result<Arc<Connection>> {
    let conn = sessions.open(sink, peer_addr).await;
    let id = conn.id();

    let grant = sessions.authenticate(id, request).await?;
    let welcome = ServerMessage::Welcome {
        conn_id: id,
        series: grant.series.clone(),
        class: grant.class().to_string(),
    };
    if tx.try_send(Outbound::Reply(welcome)).is_err() {
        sessions.teardown(id).await;
        return Err(Error::InvalidTransition {
            id,
            phase: SessionPhase::Closed,
            action: "go live",
        });
    }

    if let Err(e) = sessions.go_live(id).await {
        sessions.teardown(id).await;
        return Err(e);
    }
    Ok(conn)
}

async fn read_loop(
    mut read: WsReader,
    conn: &Arc<Connection>,
    sessions: &SessionManager,
    tx: &mpsc::Sender<Outbound>,
) -> Result<()> {
    loop {
        let frame = tokio::select! {
            frame = read.next() => frame,
            _ = conn.closed() => return Ok(()),
        };
        let Some(frame) = frame else {
            return Ok(());
        };
        let message = frame?;

        // Any frame counts as a heartbeat
        if sessions.touch(conn.id()).await.is_err() {
            return Ok(());
        }

        match message {
            Message::Text(text) => {
                let reply = handle_control(text.as_str(), conn, sessions).await;
                if tx.send(Outbound::Reply(reply)).await.is_err() {
                    return Ok(());
                }
            }
            Message::Close(_) => return Ok(()),
            _ => {}
        }
    }
}

async fn handle_control(text: &str, conn: &Connection, sessions: &SessionManager) -> ServerMessage {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(conn_id = conn.id(), error = %e, "Malformed control message");
            return ServerMessage::error(Error::Protocol(e));
        }
    };

    let id = conn.id();
    let result = match message {
        ClientMessage::Ping => return ServerMessage::Pong,
        ClientMessage::SetWatch { items } => sessions.set_watch(id, items).await,
        ClientMessage::AddWatch { item } => sessions.add_watch(id, item).await.map(|_| ()),
        ClientMessage::RemoveWatch { item } => {
            sessions.remove_watch(id, &item).await.map(|_| ())
        }
        ClientMessage::Subscribe { series } => {
            return match sessions.subscribe_updates(id, &series).await {
                Ok(()) => subscribed(conn),
                Err(e) => ServerMessage::error(e),
            };
        }
        ClientMessage::Unsubscribe { series } => {
            return match sessions.unsubscribe_updates(id, &series).await {
                Ok(_) => subscribed(conn),
                Err(e) => ServerMessage::error(e),
            };
        }
    };

    match result {
        Ok(()) => ServerMessage::Watching {
            items: conn.watch_list(),
        },
        Err(e) => ServerMessage::error(e),
    }
}

fn subscribed(conn: &Connection) -> ServerMessage {
    ServerMessage::Subscribed {
        series: conn
            .registrations()
            .into_iter()
            .map(|(series, _)| series)
            .collect(),
    }
}

async fn write_loop(mut write: WsWriter, mut rx: mpsc::Receiver<Outbound>, conn: Arc<Connection>) {
    loop {
        let outbound = tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(outbound) => outbound,
                None => break,
            },
            _ = conn.closed() => break,
        };

        let text = match &outbound {
            Outbound::Update(update) => encode_update(update),
            Outbound::Reply(reply) => reply.encode(),
        };
        let text = match text {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(conn_id = conn.id(), error = %e, "Failed to encode frame");
                break;
            }
        };

        if let Err(e) = write.send(Message::text(text)).await {
            tracing::debug!(conn_id = conn.id(), error = %e, "Write failed");
            break;
        }
    }

    let _ = write.close().await;
}
