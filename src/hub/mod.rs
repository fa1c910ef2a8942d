//! Hub orchestration
//!
//! One hub owns three listeners (relay, ingestion, viewer) and a single
//! main-loop task. The main loop is the only owner of the slot table: it
//! admits relay peers, applies fan-out for inbound chunks, prunes dead
//! slots on the scheduling tick, and drives the supervised links on the
//! same cadence. Per-connection reading happens in reader tasks that
//! forward chunks over a channel, so there is no cross-task contention on
//! the table; the frame store is the only resource shared between the
//! main loop's side of the world and the viewer sessions.
//!
//! ```text
//!  leaves ──TCP──► relay listener ─► SlotTable ─► fan-out ─► leaves
//!                                        │                     │
//!                                        └──────► uplink ──────┘ (optional)
//!  producer ─TCP─► ingest listener ─► read_frame ─► FrameStore
//!                                                       │ snapshot()
//!  viewers ──TCP─► viewer listener ─► multipart stream ─┘
//! ```

pub mod config;
pub mod relay;
pub mod slots;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::ingest::{self, IngestError};
use crate::stats::HubStats;
use crate::store::FrameStore;
use crate::supervisor::SupervisedLink;
use crate::transport::TcpTransport;
use crate::viewer;

pub use config::{HubConfig, MembershipConfig};
pub use slots::{SlotId, SlotTable, SlotsFull};

/// Event from a slot's reader task to the main loop.
///
/// The epoch pins the event to one occupancy of the slot: events from a
/// reader whose slot has since been reclaimed are discarded.
#[derive(Debug)]
enum SlotEvent {
    Data {
        slot: SlotId,
        epoch: u64,
        chunk: Bytes,
    },
    Closed {
        slot: SlotId,
        epoch: u64,
    },
}

/// The aggregator node: relay, ingestion, frame store, viewer streaming,
/// link supervision.
pub struct Hub {
    config: HubConfig,
    relay_listener: TcpListener,
    ingest_listener: TcpListener,
    viewer_listener: TcpListener,
    relay_addr: SocketAddr,
    ingest_addr: SocketAddr,
    viewer_addr: SocketAddr,
    store: Arc<FrameStore>,
    stats: Arc<HubStats>,
}

impl Hub {
    /// Bind all listeners. Addresses with port 0 are resolved here; the
    /// actual addresses are available before `run`.
    pub async fn bind(config: HubConfig) -> Result<Self> {
        if config.max_slots == 0 {
            return Err(Error::Config("max_slots must be at least 1".into()));
        }

        let relay_listener = TcpListener::bind(config.relay_addr).await?;
        let ingest_listener = TcpListener::bind(config.ingest_addr).await?;
        let viewer_listener = TcpListener::bind(config.viewer_addr).await?;

        let relay_addr = relay_listener.local_addr()?;
        let ingest_addr = ingest_listener.local_addr()?;
        let viewer_addr = viewer_listener.local_addr()?;

        Ok(Self {
            store: Arc::new(FrameStore::with_snapshot_timeout(config.snapshot_timeout)),
            stats: Arc::new(HubStats::new()),
            config,
            relay_listener,
            ingest_listener,
            viewer_listener,
            relay_addr,
            ingest_addr,
            viewer_addr,
        })
    }

    /// Actual relay listener address.
    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    /// Actual ingestion listener address.
    pub fn ingest_addr(&self) -> SocketAddr {
        self.ingest_addr
    }

    /// Actual viewer listener address.
    pub fn viewer_addr(&self) -> SocketAddr {
        self.viewer_addr
    }

    /// Shared frame store.
    pub fn store(&self) -> Arc<FrameStore> {
        Arc::clone(&self.store)
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<HubStats> {
        Arc::clone(&self.stats)
    }

    /// Run the hub until the surrounding task is cancelled.
    pub async fn run(self) -> Result<()> {
        let Hub {
            config,
            relay_listener,
            ingest_listener,
            viewer_listener,
            relay_addr,
            ingest_addr,
            viewer_addr,
            store,
            stats,
        } = self;

        tracing::info!(
            relay = %relay_addr,
            ingest = %ingest_addr,
            viewer = %viewer_addr,
            max_slots = config.max_slots,
            "hub listening"
        );

        let viewer_task = tokio::spawn(accept_viewers(
            viewer_listener,
            Arc::clone(&store),
            Arc::clone(&stats),
            config.clone(),
        ));
        let ingest_task = tokio::spawn(accept_producers(
            ingest_listener,
            Arc::clone(&store),
            Arc::clone(&stats),
            config.clone(),
        ));

        let result = main_loop(relay_listener, &config, &stats).await;

        viewer_task.abort();
        ingest_task.abort();
        result
    }
}

/// The hub's scheduling loop: relay admission, fan-out, prune, and link
/// supervision. Exclusive owner of the slot table.
async fn main_loop(
    relay_listener: TcpListener,
    config: &HubConfig,
    stats: &Arc<HubStats>,
) -> Result<()> {
    let mut slots: SlotTable<TcpTransport> = SlotTable::new(config.max_slots);
    let (event_tx, mut event_rx) = mpsc::channel::<SlotEvent>(64);

    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut membership = config.membership.as_ref().map(|m| {
        tracing::info!(
            identity = %m.identity,
            controller = %m.controller_addr,
            "supervising upstream network membership"
        );
        SupervisedLink::new(
            "membership",
            m.controller_addr,
            config.retry_interval,
            config.connect_timeout,
            config.tcp_nodelay,
        )
    });
    let mut uplink = config.uplink_addr.map(|addr| {
        tracing::info!(upstream = %addr, "supervising outbound aggregation link");
        SupervisedLink::new(
            "uplink",
            addr,
            config.retry_interval,
            config.connect_timeout,
            config.tcp_nodelay,
        )
    });

    loop {
        tokio::select! {
            accepted = relay_listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    admit_peer(socket, peer, &mut slots, &event_tx, config, stats).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "relay accept failed");
                }
            },

            Some(event) = event_rx.recv() => match event {
                SlotEvent::Data { slot, epoch, chunk } => {
                    if slots.epoch(slot) != Some(epoch) {
                        continue; // stale reader, slot since reclaimed
                    }
                    let reached = relay::fan_out(&mut slots, slot, &chunk).await;
                    stats.record_relayed(chunk.len() as u64 * reached as u64);
                    tracing::trace!(slot, len = chunk.len(), reached, "relayed chunk");
                    if let Some(link) = uplink.as_mut() {
                        link.forward(&chunk).await;
                    }
                }
                SlotEvent::Closed { slot, epoch } => {
                    if slots.epoch(slot) == Some(epoch) {
                        tracing::debug!(slot, "peer disconnected");
                        slots.mark_dead(slot);
                    }
                }
            },

            _ = ticker.tick() => {
                slots.prune().await;
                let now = Instant::now();
                if let Some(link) = membership.as_mut() {
                    link.tick(now).await;
                }
                if let Some(link) = uplink.as_mut() {
                    link.tick(now).await;
                }
            }
        }
    }
}

/// Admit one relay peer, spawning its reader task on success. A full table
/// closes the newcomer immediately; existing peers are unaffected.
async fn admit_peer(
    socket: TcpStream,
    peer: SocketAddr,
    slots: &mut SlotTable<TcpTransport>,
    event_tx: &mpsc::Sender<SlotEvent>,
    config: &HubConfig,
    stats: &Arc<HubStats>,
) {
    if config.tcp_nodelay {
        let _ = socket.set_nodelay(true);
    }

    let (reader, writer) = socket.into_split();
    match slots.admit(TcpTransport::new(writer, peer)).await {
        Ok(slot) => {
            stats.record_admitted();
            let epoch = slots.epoch(slot).unwrap_or_default();
            tracing::info!(slot, peer = %peer, "peer admitted");
            tokio::spawn(run_slot_reader(
                reader,
                slot,
                epoch,
                config.read_chunk_size,
                event_tx.clone(),
            ));
        }
        Err(SlotsFull) => {
            stats.record_rejected();
            tracing::warn!(peer = %peer, "peer rejected: slot table full");
        }
    }
}

/// Read opaque chunks off one slot's connection and forward them to the
/// main loop. Ends on EOF, read error, or hub shutdown.
async fn run_slot_reader(
    mut reader: OwnedReadHalf,
    slot: SlotId,
    epoch: u64,
    chunk_size: usize,
    tx: mpsc::Sender<SlotEvent>,
) {
    let mut buf = BytesMut::with_capacity(chunk_size);
    loop {
        buf.reserve(chunk_size);
        match reader.read_buf(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let chunk = buf.split().freeze();
                if tx.send(SlotEvent::Data { slot, epoch, chunk }).await.is_err() {
                    return; // main loop gone
                }
            }
        }
    }
    let _ = tx.send(SlotEvent::Closed { slot, epoch }).await;
}

/// Accept loop for the ingestion port. A new producer replaces the active
/// one: the previous task is aborted, which closes its socket.
async fn accept_producers(
    listener: TcpListener,
    store: Arc<FrameStore>,
    stats: Arc<HubStats>,
    config: HubConfig,
) {
    let mut active: Option<JoinHandle<()>> = None;
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                if config.tcp_nodelay {
                    let _ = socket.set_nodelay(true);
                }
                if let Some(previous) = active.take() {
                    if !previous.is_finished() {
                        tracing::info!(peer = %peer, "new producer replaces active ingestion connection");
                    }
                    previous.abort();
                }
                active = Some(tokio::spawn(run_producer(
                    socket,
                    peer,
                    Arc::clone(&store),
                    Arc::clone(&stats),
                )));
            }
            Err(e) => {
                tracing::error!(error = %e, "ingestion accept failed");
            }
        }
    }
}

/// Service one ingestion connection: validated frames replace the store's
/// content; any protocol violation or transport failure ends the
/// connection without touching the store.
async fn run_producer(
    mut socket: TcpStream,
    peer: SocketAddr,
    store: Arc<FrameStore>,
    stats: Arc<HubStats>,
) {
    tracing::info!(peer = %peer, "ingestion producer connected");
    loop {
        match ingest::read_frame(&mut socket).await {
            Ok(data) => {
                let len = data.len();
                let generation = store.replace(data).await;
                stats.record_frame();
                tracing::trace!(len, generation, "frame ingested");
            }
            Err(IngestError::Closed) => {
                tracing::info!(peer = %peer, "ingestion producer disconnected");
                break;
            }
            Err(e) if e.is_protocol_violation() => {
                stats.record_frame_rejected();
                tracing::warn!(peer = %peer, error = %e, "ingestion protocol violation, closing");
                break;
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "ingestion read failed");
                break;
            }
        }
    }
}

/// Accept loop for the viewer port; every viewer gets an independent
/// session task.
async fn accept_viewers(
    listener: TcpListener,
    store: Arc<FrameStore>,
    stats: Arc<HubStats>,
    config: HubConfig,
) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                if config.tcp_nodelay {
                    let _ = socket.set_nodelay(true);
                }
                tracing::debug!(peer = %peer, "viewer connected");
                tokio::spawn(viewer::handle_viewer(
                    socket,
                    Arc::clone(&store),
                    config.viewer_interval,
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "viewer accept failed");
            }
        }
    }
}
