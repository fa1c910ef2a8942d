//! Streaming transport abstraction
//!
//! The hub's slot table and supervised links are written against the
//! [`Transport`] trait rather than a concrete socket type, so the relay and
//! admission logic can be exercised in tests without real connections.
//!
//! Writing goes through the transport; reading does not. Each accepted
//! connection hands its read half to a dedicated reader task that forwards
//! chunks to the owning loop over a channel, which keeps the slot table
//! single-owner (see `hub`).

use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Write-side capability set of a streaming connection.
pub trait Transport {
    /// Write the whole chunk and flush it.
    fn send(&mut self, chunk: &[u8]) -> impl std::future::Future<Output = io::Result<()>> + Send;

    /// Whether the connection is still usable for writing.
    fn is_connected(&self) -> bool;

    /// Shut down the connection. Idempotent.
    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

/// TCP-backed transport over the owned write half of a stream.
///
/// The matching read half is returned by [`TcpTransport::connect`] or taken
/// from `TcpStream::into_split` by the accept path; it belongs to a reader
/// task, never to the transport.
#[derive(Debug)]
pub struct TcpTransport {
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    open: bool,
}

impl TcpTransport {
    /// Wrap an already-accepted connection's write half.
    pub fn new(writer: OwnedWriteHalf, peer: SocketAddr) -> Self {
        Self {
            writer,
            peer,
            open: true,
        }
    }

    /// Dial a peer and split the stream into a transport and its read half.
    pub async fn connect(addr: SocketAddr, nodelay: bool) -> io::Result<(Self, OwnedReadHalf)> {
        let stream = TcpStream::connect(addr).await?;
        if nodelay {
            stream.set_nodelay(true)?;
        }
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok((Self::new(writer, peer), reader))
    }

    /// Remote peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    async fn send(&mut self, chunk: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }

        let result = async {
            self.writer.write_all(chunk).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(e) = result {
            // A failed write means the peer is gone for our purposes.
            self.open = false;
            return Err(e);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.writer.shutdown().await;
        }
    }
}

/// In-memory transport recording everything sent to it.
///
/// Shared by the slot table and relay tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pub sent: Vec<u8>,
    pub connected: bool,
    pub fail_next_send: bool,
    pub close_calls: usize,
}

#[cfg(test)]
impl MockTransport {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    async fn send(&mut self, chunk: &[u8]) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock closed"));
        }
        if self.fail_next_send {
            self.fail_next_send = false;
            self.connected = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        self.sent.extend_from_slice(chunk);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) {
        self.connected = false;
        self.close_calls += 1;
    }
}
