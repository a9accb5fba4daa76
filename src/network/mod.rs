//! # Network Module
//!
//! UDP link to the peer bridge.
//!
//! Data datagrams carry serial chunks unmodified, with no header. The only
//! other datagram is the heartbeat marker.

pub mod heartbeat;

pub use heartbeat::{is_heartbeat, HEARTBEAT_DATAGRAM};

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::info;

use crate::error::{BridgeError, Result};

/// Largest datagram the bridge accepts; larger ones are dropped
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Datagram transport to the peer bridge
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram to the peer
    async fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// Receive one datagram and its sender
    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// UDP socket bound locally, sending to a fixed peer
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpTransport {
    /// Bind `0.0.0.0:{local_port}` and resolve the peer address
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound or the peer cannot be resolved
    pub async fn bind(local_port: u16, remote_host: &str, remote_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))
            .await
            .map_err(|source| BridgeError::NetworkBind {
                port: local_port,
                source,
            })?;

        let remote = resolve(remote_host, remote_port).await?;
        info!(
            "UDP bound on {}, sending to {}",
            socket.local_addr()?,
            remote
        );

        Ok(Self { socket, remote })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{}:{}", host, port);
    let candidates: Vec<SocketAddr> = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| BridgeError::RemoteResolve(format!("{}: {}", target, e)))?
        .collect();

    // Prefer IPv4 to match the socket bound above
    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| BridgeError::RemoteResolve(format!("{}: no addresses", target)))
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send_to(datagram, self.remote).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
