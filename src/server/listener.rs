//! Live feed listener
//!
//! Accepts sockets, enforces the connection cap and hands each socket to its
//! own task. Shutting down tears every session down before returning.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::broadcast::Dispatcher;
use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::serve_socket;
use crate::session::{Authenticator, SessionConfig, SessionManager};

/// WebSocket server for live result updates
///
/// Owns the session manager (and through it the registry) for its whole
/// lifetime. Event sources publish through [`LiveServer::dispatcher`].
pub struct LiveServer {
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    dispatcher: Dispatcher,
    slots: Option<Arc<Semaphore>>,
}

impl LiveServer {
    pub fn new(config: ServerConfig, authenticator: impl Authenticator) -> Self {
        Self::with_session_config(config, authenticator, SessionConfig::default())
    }

    /// Server with custom idle timeout, reaping and subscription rules
    pub fn with_session_config(
        config: ServerConfig,
        authenticator: impl Authenticator,
        session_config: SessionConfig,
    ) -> Self {
        let slots = (config.max_connections > 0)
            .then(|| Arc::new(Semaphore::new(config.max_connections)));

        let sessions = Arc::new(SessionManager::with_config(session_config, authenticator));
        let dispatcher = Dispatcher::new(Arc::clone(&sessions));

        Self {
            config,
            sessions,
            dispatcher,
            slots,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.sessions.registry()
    }

    /// Dispatcher for change notifications; cheap to clone
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind and serve forever
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// Every connection is torn down before this returns.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Live server listening");

        let reaper = self.sessions.spawn_reaper();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Live server stopping");
                Ok(())
            }
            result = self.accept_sockets(&listener) => result,
        };

        reaper.abort();
        let closed = self.sessions.shutdown().await;
        tracing::info!(addr = %addr, closed = closed, "Live server stopped");

        result
    }

    async fn accept_sockets(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.spawn_socket(socket, peer_addr),
                Err(e) => tracing::error!(error = %e, "Accept failed"),
            }
        }
    }

    fn acquire_slot(&self, peer_addr: SocketAddr) -> Option<Option<OwnedSemaphorePermit>> {
        let Some(slots) = &self.slots else {
            return Some(None);
        };
        match Arc::clone(slots).try_acquire_owned() {
            Ok(permit) => Some(Some(permit)),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Socket refused: connection cap reached");
                None
            }
        }
    }

    fn spawn_socket(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let Some(permit) = self.acquire_slot(peer_addr) else {
            return;
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(peer = %peer_addr, error = %e, "Could not set TCP_NODELAY");
                return;
            }
        }

        tracing::debug!(peer = %peer_addr, "Socket accepted");

        let config = self.config.clone();
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            // Slot is released when the socket task ends
            let _permit = permit;

            if let Err(e) = serve_socket(socket, peer_addr, config, sessions).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Socket ended with error");
            }
            tracing::debug!(peer = %peer_addr, "Socket closed");
        });
    }
}
