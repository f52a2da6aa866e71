//! Socket provisioning for bonded links.
//!
//! One `LinkPath` wraps one bound UDP socket, identified by its position in
//! the bonded set. Paths on the send side carry the remote endpoint their
//! packets travel to; paths on the receive side have none.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// One physical path of a bonded set: a bound UDP socket plus an optional
/// remote peer.
#[derive(Clone)]
pub struct LinkPath {
    /// Path identifier (index in the bonded set)
    pub id: usize,
    /// Bound UDP socket
    socket: Arc<UdpSocket>,
    /// Remote peer address (send side only)
    peer: Option<SocketAddr>,
}

impl LinkPath {
    /// Bind a new path on `local`, optionally aimed at `peer`
    pub async fn bound(id: usize, local: SocketAddr, peer: Option<SocketAddr>) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        Ok(Self {
            id,
            socket: Arc::new(socket),
            peer,
        })
    }

    /// Send a datagram to this path's peer
    pub async fn send(&self, data: &[u8]) -> io::Result<usize> {
        let peer = self.peer.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "path has no remote peer")
        })?;
        self.socket.send_to(data, peer).await
    }

    /// Receive a datagram on this path
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    /// Get the local address the socket bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
