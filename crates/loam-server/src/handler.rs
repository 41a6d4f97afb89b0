//! Query handler interface.

use crate::Protocol;
use async_trait::async_trait;
use loam_proto::Message;
use std::net::SocketAddr;
use std::time::Instant;

/// Context for one DNS query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Client address.
    pub client: SocketAddr,
    /// Transport the query arrived on.
    pub protocol: Protocol,
    /// When the query was received.
    pub received_at: Instant,
}

impl QueryContext {
    /// Creates a context stamped with the current time.
    pub fn new(client: SocketAddr, protocol: Protocol) -> Self {
        Self {
            client,
            protocol,
            received_at: Instant::now(),
        }
    }

    /// Maximum response size for this transport.
    pub fn max_response_size(&self) -> usize {
        match self.protocol {
            Protocol::Udp => 512,
            Protocol::Tcp => 65535,
        }
    }

    /// Time elapsed since the query was received.
    pub fn elapsed(&self) -> std::time::Duration {
        self.received_at.elapsed()
    }
}

/// Processes parsed DNS queries into responses.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Handles one query; always produces a response message.
    async fn handle(&self, query: Message, context: QueryContext) -> Message;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_response_size() {
        let udp = QueryContext::new("127.0.0.1:1000".parse().unwrap(), Protocol::Udp);
        assert_eq!(udp.max_response_size(), 512);

        let tcp = QueryContext::new("127.0.0.1:1000".parse().unwrap(), Protocol::Tcp);
        assert_eq!(tcp.max_response_size(), 65535);
    }
}
