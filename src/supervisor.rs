//! Link supervision
//!
//! Rate-limited reconnection state machines for the hub's own upstream
//! network membership and for the optional outbound aggregation link.
//! Attempts are gated by a constant retry interval: a persistently
//! unreachable target produces one attempt per interval, never a storm.
//! There is no backoff growth; the interval is a config field, not a
//! hidden constant.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use crate::transport::{TcpTransport, Transport};

/// Connection status of a supervised link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Not connected; eligible for an attempt once the interval elapses
    Disconnected,
    /// Attempt in flight
    Connecting,
    /// Link is up
    Connected,
}

/// Reconnection state machine for one supervised link.
///
/// Pure transitions over explicit instants so the rate-limit contract can
/// be tested without a clock.
#[derive(Debug)]
pub struct LinkState {
    status: LinkStatus,
    last_attempt: Option<Instant>,
    retry_interval: Duration,
}

impl LinkState {
    /// Create a disconnected link with the given retry interval.
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            status: LinkStatus::Disconnected,
            last_attempt: None,
            retry_interval,
        }
    }

    /// Current status.
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Whether a connect attempt may be issued at `now`.
    ///
    /// True only when disconnected and at least `retry_interval` has
    /// passed since the previous attempt (or none was ever made).
    pub fn should_attempt(&self, now: Instant) -> bool {
        if self.status != LinkStatus::Disconnected {
            return false;
        }
        match self.last_attempt {
            None => true,
            Some(at) => now.duration_since(at) >= self.retry_interval,
        }
    }

    /// Record that an attempt is starting at `now`.
    pub fn begin_attempt(&mut self, now: Instant) {
        self.status = LinkStatus::Connecting;
        self.last_attempt = Some(now);
    }

    /// The in-flight attempt succeeded.
    pub fn connected(&mut self) {
        self.status = LinkStatus::Connected;
    }

    /// The in-flight attempt failed. Non-fatal; retried after the interval.
    pub fn attempt_failed(&mut self) {
        self.status = LinkStatus::Disconnected;
    }

    /// A previously healthy link failed its liveness check.
    pub fn link_lost(&mut self) {
        self.status = LinkStatus::Disconnected;
    }
}

/// A supervised outbound TCP link driven on the hub's scheduling cadence.
///
/// Used for both the membership link (keep-alive only) and the aggregation
/// link (receives forwarded relay chunks). Liveness is observed through a
/// watcher task owning the read half: when the peer closes, the shared
/// flag flips and the next tick transitions the state machine back to
/// `Disconnected`.
pub struct SupervisedLink {
    name: &'static str,
    addr: SocketAddr,
    state: LinkState,
    conn: Option<TcpTransport>,
    peer_open: Arc<AtomicBool>,
    connect_timeout: Duration,
    nodelay: bool,
}

impl SupervisedLink {
    /// Create a supervised link toward `addr`.
    pub fn new(
        name: &'static str,
        addr: SocketAddr,
        retry_interval: Duration,
        connect_timeout: Duration,
        nodelay: bool,
    ) -> Self {
        Self {
            name,
            addr,
            state: LinkState::new(retry_interval),
            conn: None,
            peer_open: Arc::new(AtomicBool::new(false)),
            connect_timeout,
            nodelay,
        }
    }

    /// Current status.
    pub fn status(&self) -> LinkStatus {
        self.state.status()
    }

    /// Run one supervision tick: check liveness, attempt a reconnect if
    /// the interval allows.
    pub async fn tick(&mut self, now: Instant) {
        if self.state.status() == LinkStatus::Connected {
            let alive = self.peer_open.load(Ordering::Relaxed)
                && self.conn.as_ref().is_some_and(|c| c.is_connected());
            if alive {
                return;
            }
            tracing::info!(link = self.name, addr = %self.addr, "link lost");
            self.drop_conn().await;
            self.state.link_lost();
        }

        if !self.state.should_attempt(now) {
            return;
        }

        self.state.begin_attempt(now);
        tracing::debug!(link = self.name, addr = %self.addr, "connect attempt");

        match timeout(self.connect_timeout, TcpTransport::connect(self.addr, self.nodelay)).await {
            Ok(Ok((transport, mut reader))) => {
                let peer_open = Arc::new(AtomicBool::new(true));
                // Watcher drains (and discards) anything the peer sends;
                // EOF or error flips the liveness flag.
                let flag = Arc::clone(&peer_open);
                tokio::spawn(async move {
                    let mut sink = [0u8; 1024];
                    loop {
                        match reader.read(&mut sink).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                    flag.store(false, Ordering::Relaxed);
                });

                self.peer_open = peer_open;
                self.conn = Some(transport);
                self.state.connected();
                tracing::info!(link = self.name, addr = %self.addr, "link established");
            }
            Ok(Err(e)) => {
                self.state.attempt_failed();
                tracing::debug!(link = self.name, addr = %self.addr, error = %e, "connect failed");
            }
            Err(_) => {
                self.state.attempt_failed();
                tracing::debug!(link = self.name, addr = %self.addr, "connect timed out");
            }
        }
    }

    /// Forward a chunk over the link, best effort. A write failure marks
    /// the link lost; the next tick schedules the reconnect.
    pub async fn forward(&mut self, chunk: &[u8]) {
        if self.state.status() != LinkStatus::Connected {
            return;
        }
        if let Some(conn) = self.conn.as_mut() {
            if let Err(e) = conn.send(chunk).await {
                tracing::debug!(link = self.name, error = %e, "forward failed, link lost");
                self.drop_conn().await;
                self.state.link_lost();
            }
        }
    }

    async fn drop_conn(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
        self.peer_open.store(false, Ordering::Relaxed);
    }
}
