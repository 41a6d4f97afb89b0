//! UDP listener.

use crate::handler::{QueryContext, QueryHandler};
use crate::{Protocol, Result};
use loam_proto::Message;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace};

/// UDP DNS listener; each datagram is handled in its own task.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
}

impl UdpServer {
    /// Binds the listener with reuse-addr/port set.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!(addr = %local_addr, "UDP listener bound");
        Ok(Self {
            socket: Arc::new(socket),
            handler,
            local_addr,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receives datagrams until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; 65535];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    let data = buf[..len].to_vec();
                    let socket = self.socket.clone();
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = process_datagram(socket, handler, data, src).await {
                            debug!(error = %e, client = %src, "UDP query failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "UDP receive error");
                }
            }
        }
    }
}

async fn process_datagram(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    data: Vec<u8>,
    src: SocketAddr,
) -> Result<()> {
    let query = match Message::parse(&data) {
        Ok(message) => message,
        Err(e) => {
            // Malformed datagrams are dropped, not answered.
            trace!(error = %e, client = %src, "dropping unparseable datagram");
            return Ok(());
        }
    };

    let context = QueryContext::new(src, Protocol::Udp);
    let max_size = context.max_response_size();
    let mut response = handler.handle(query, context).await;

    let wire = match response.to_wire() {
        Ok(wire) if wire.len() <= max_size => wire,
        Ok(_) => {
            response
                .truncate_to(max_size)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            response
                .to_wire()
                .map_err(|e| std::io::Error::other(e.to_string()))?
        }
        Err(e) => return Err(std::io::Error::other(e.to_string()).into()),
    };

    socket.send_to(&wire, src).await?;
    Ok(())
}
