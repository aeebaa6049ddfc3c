//! Live feed listener settings

use std::net::SocketAddr;
use std::time::Duration;

/// Default WebSocket port for the live results feed
pub const DEFAULT_PORT: u16 = 4080;

/// Listener and per-socket settings for [`LiveServer`](super::LiveServer)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where the WebSocket listener binds
    pub bind_addr: SocketAddr,

    /// Cap on simultaneous sockets; 0 leaves it uncapped
    pub max_connections: usize,

    /// Per-connection outbound queue capacity. A connection whose queue
    /// fills up is treated as a failed delivery and torn down.
    pub outbound_capacity: usize,

    /// WebSocket handshake and authentication must complete within this time
    pub handshake_timeout: Duration,

    /// Set TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0,
            outbound_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Defaults, listening on `addr`
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self::default().bind(addr)
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_connections(mut self, limit: usize) -> Self {
        self.max_connections = limit;
        self
    }

    /// Outbound queue depth per connection (at least 1)
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_listen_on_feed_port() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr_keeps_other_defaults() {
        let addr: SocketAddr = "127.0.0.1:4081".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.outbound_capacity, 256);
    }

    #[test]
    fn test_outbound_capacity_floor() {
        let config = ServerConfig::default().outbound_capacity(0);

        assert_eq!(config.outbound_capacity, 1);
    }

    #[test]
    fn test_builders_compose() {
        let addr: SocketAddr = "127.0.0.1:4090".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(500)
            .outbound_capacity(32)
            .handshake_timeout(Duration::from_secs(5));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 500);
        assert_eq!(config.outbound_capacity, 32);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    }
}
