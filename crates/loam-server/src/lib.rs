//! # Loam DNS server infrastructure
//!
//! Async UDP and TCP listeners feeding a [`QueryHandler`], with graceful
//! shutdown and atomic server statistics. The listeners are
//! protocol-plumbing only; resolution policy lives in the handler the
//! binary wires in.

use async_trait::async_trait;
use loam_proto::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod handler;
pub mod stats;
pub mod tcp;
pub mod udp;

pub use handler::{QueryContext, QueryHandler};
pub use stats::ServerStats;
pub use tcp::TcpServer;
pub use udp::UdpServer;

/// Server errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket or I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid listener configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// DNS transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain UDP.
    Udp,
    /// Plain TCP.
    Tcp,
}

impl Protocol {
    /// Returns the protocol name.
    pub const fn name(&self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both listeners bind.
    pub listen: SocketAddr,
    /// UDP read/write timeout (also the per-request deadline hint).
    pub udp_timeout: Duration,
    /// TCP idle-connection timeout.
    pub tcp_timeout: Duration,
    /// Grace period for in-flight requests at shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5353".parse().expect("static addr"),
            udp_timeout: Duration::from_secs(5),
            tcp_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// A DNS server running one UDP and one TCP listener on the same port.
pub struct DnsServer {
    config: ServerConfig,
    handler: Arc<dyn QueryHandler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DnsServer {
    /// Creates a server; nothing is bound until [`DnsServer::run`].
    pub fn new(config: ServerConfig, handler: Arc<dyn QueryHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            shutdown_tx,
        }
    }

    /// Binds and runs both listeners until shutdown is signalled.
    pub async fn run(&self) -> Result<()> {
        let udp = UdpServer::bind(self.config.listen, self.handler.clone()).await?;
        let tcp = TcpServer::bind(
            self.config.listen,
            self.handler.clone(),
            self.config.tcp_timeout,
        )
        .await?;

        let mut udp_shutdown = self.shutdown_tx.subscribe();
        let udp_handle = tokio::spawn(async move {
            tokio::select! {
                result = udp.run() => result,
                _ = udp_shutdown.recv() => Ok(()),
            }
        });

        let mut tcp_shutdown = self.shutdown_tx.subscribe();
        let tcp_handle = tokio::spawn(async move {
            tokio::select! {
                result = tcp.run() => result,
                _ = tcp_shutdown.recv() => Ok(()),
            }
        });

        for handle in [udp_handle, tcp_handle] {
            handle
                .await
                .map_err(|e| ServerError::Io(std::io::Error::other(e)))??;
        }
        Ok(())
    }

    /// Signals the listeners to stop accepting work.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// A handler that answers SERVFAIL to everything; a placeholder for wiring
/// tests.
pub struct ServfailHandler;

#[async_trait]
impl QueryHandler for ServfailHandler {
    async fn handle(&self, query: Message, _context: QueryContext) -> Message {
        let mut response = Message::response_to(&query);
        response.set_rcode(loam_proto::Rcode::ServFail);
        response
    }
}
