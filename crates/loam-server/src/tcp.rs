//! TCP listener with 2-byte length framing.

use crate::handler::{QueryContext, QueryHandler};
use crate::{Protocol, Result};
use loam_proto::Message;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

/// TCP DNS listener; each connection is handled in its own task and may
/// carry multiple queries.
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    idle_timeout: Duration,
}

impl TcpServer {
    /// Binds the listener with reuse-addr/port set.
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn QueryHandler>,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "TCP listener bound");
        Ok(Self {
            listener,
            handler,
            local_addr,
            idle_timeout,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = self.handler.clone();
                    let idle_timeout = self.idle_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, handler, idle_timeout).await
                        {
                            debug!(error = %e, client = %peer, "TCP connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept error");
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn QueryHandler>,
    idle_timeout: Duration,
) -> Result<()> {
    trace!(client = %peer, "TCP connection opened");

    loop {
        let query_bytes = match timeout(idle_timeout, read_message(&mut stream)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    trace!(client = %peer, "TCP connection closed by client");
                } else {
                    debug!(error = %e, client = %peer, "TCP read error");
                }
                return Ok(());
            }
            Err(_) => {
                trace!(client = %peer, "TCP connection idle timeout");
                return Ok(());
            }
        };

        let query = match Message::parse(&query_bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, client = %peer, "dropping unparseable TCP query");
                continue;
            }
        };

        let context = QueryContext::new(peer, Protocol::Tcp);
        let response = handler.handle(query, context).await;
        let wire = response
            .to_wire()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        write_message(&mut stream, &wire).await?;
    }
}

/// Reads one length-prefixed DNS message.
async fn read_message(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "zero-length TCP message",
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Writes one length-prefixed DNS message.
async fn write_message(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    let len = data.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServfailHandler;

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let server = TcpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(ServfailHandler),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(server.local_addr().port() > 0);
    }
}
