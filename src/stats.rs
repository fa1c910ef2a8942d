//! Hub-wide counters
//!
//! Shared across the main loop, ingestion, and viewer tasks via `Arc`.
//! All counters are relaxed atomics; they feed logs and tests, nothing
//! load-bearing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one hub instance.
#[derive(Debug, Default)]
pub struct HubStats {
    /// Peer connections admitted into a slot
    pub peers_admitted: AtomicU64,
    /// Peer connections rejected because the table was full
    pub peers_rejected: AtomicU64,
    /// Total bytes fanned out to relay peers
    pub bytes_relayed: AtomicU64,
    /// Frames accepted into the store
    pub frames_ingested: AtomicU64,
    /// Ingestion protocol violations (zero/oversized lengths)
    pub frames_rejected: AtomicU64,
    /// Viewer streaming sessions started
    pub viewers_started: AtomicU64,
    /// Viewer streaming sessions currently active
    pub viewers_active: AtomicU64,
}

impl HubStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.peers_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.peers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relayed(&self, bytes: u64) {
        self.bytes_relayed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn viewer_started(&self) {
        self.viewers_started.fetch_add(1, Ordering::Relaxed);
        self.viewers_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn viewer_finished(&self) {
        self.viewers_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time copy for logging and assertions.
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            peers_admitted: self.peers_admitted.load(Ordering::Relaxed),
            peers_rejected: self.peers_rejected.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            frames_ingested: self.frames_ingested.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            viewers_started: self.viewers_started.load(Ordering::Relaxed),
            viewers_active: self.viewers_active.load(Ordering::Relaxed),
        }
    }
}

/// Plain snapshot of [`HubStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub peers_admitted: u64,
    pub peers_rejected: u64,
    pub bytes_relayed: u64,
    pub frames_ingested: u64,
    pub frames_rejected: u64,
    pub viewers_started: u64,
    pub viewers_active: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = HubStats::new();

        stats.record_admitted();
        stats.record_admitted();
        stats.record_rejected();
        stats.record_relayed(256);
        stats.record_relayed(128);
        stats.record_frame();
        stats.record_frame_rejected();

        let summary = stats.summary();
        assert_eq!(summary.peers_admitted, 2);
        assert_eq!(summary.peers_rejected, 1);
        assert_eq!(summary.bytes_relayed, 384);
        assert_eq!(summary.frames_ingested, 1);
        assert_eq!(summary.frames_rejected, 1);
    }

    #[test]
    fn test_viewer_lifecycle() {
        let stats = HubStats::new();

        stats.viewer_started();
        stats.viewer_started();
        assert_eq!(stats.summary().viewers_active, 2);

        stats.viewer_finished();
        let summary = stats.summary();
        assert_eq!(summary.viewers_started, 2);
        assert_eq!(summary.viewers_active, 1);
    }
}
