//! # meshcam
//!
//! A hub for a small fleet of networked camera nodes: one aggregator
//! ("hub") relays opaque byte traffic between peripheral peers ("leaves"),
//! ingests a length-framed image stream from a trusted producer, caches the
//! most recent frame, and republishes it as a continuously-updating
//! multipart stream to any number of HTTP viewers.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────── Hub ────────────────────────┐
//!            │                                                     │
//!  leaf ──►  │ relay port ─► SlotTable ─► fan-out (exclude sender) │ ──► leaf
//!  leaf ──►  │                  │                                  │ ──► leaf
//!            │                  └──► uplink (optional upstream)    │
//!            │                                                     │
//!  camera ─► │ ingest port ─► length-prefixed frames ─► FrameStore │
//!            │                                              │      │
//!  browser ► │ viewer port ─► multipart stream ◄─ snapshot()┘      │
//!            └─────────────────────────────────────────────────────┘
//! ```
//!
//! The slot table is bounded and owned by a single loop; the frame store is
//! the only resource shared with viewer sessions, guarded by a bounded-wait
//! mutex so slow readers skip a tick instead of blocking. Frames are
//! `bytes::Bytes`, so a snapshot is a reference-counted share rather than a
//! copy.
//!
//! # Example
//!
//! ```no_run
//! use meshcam::{Hub, HubConfig};
//!
//! # async fn example() -> meshcam::Result<()> {
//! let config = HubConfig::default()
//!     .relay("0.0.0.0:8000".parse().unwrap())
//!     .ingest("0.0.0.0:8001".parse().unwrap())
//!     .viewer("0.0.0.0:8080".parse().unwrap());
//!
//! let hub = Hub::bind(config).await?;
//! hub.run().await
//! # }
//! ```

pub mod error;
pub mod frame;
pub mod hub;
pub mod ingest;
pub mod stats;
pub mod store;
pub mod supervisor;
pub mod transport;
pub mod viewer;

pub use error::{Error, Result};
pub use frame::Frame;
pub use hub::{Hub, HubConfig, MembershipConfig};
pub use ingest::{IngestError, MAX_FRAME_LEN};
pub use stats::{HubStats, StatsSummary};
pub use store::FrameStore;
pub use supervisor::{LinkState, LinkStatus};
pub use transport::{TcpTransport, Transport};
