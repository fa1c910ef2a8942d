//! Most-recent-frame store
//!
//! Holds zero or one current [`Frame`] behind a mutex. The producer side
//! replaces the frame wholesale; every viewer session pulls point-in-time
//! snapshots. Snapshot lock acquisition is bounded: a reader that cannot
//! take the guard within the timeout gets `None` for this attempt and
//! simply retries on its next pacing tick. That skip-this-tick policy is
//! part of the contract — readers degrade, they never deadlock.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::frame::Frame;

/// Default bound on snapshot guard acquisition.
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct StoreState {
    frame: Option<Frame>,
    generation: u64,
}

/// Shared store for the single most recent validated frame.
#[derive(Debug)]
pub struct FrameStore {
    state: Mutex<StoreState>,
    snapshot_timeout: Duration,
}

impl FrameStore {
    /// Create an empty store with the default snapshot timeout.
    pub fn new() -> Self {
        Self::with_snapshot_timeout(DEFAULT_SNAPSHOT_TIMEOUT)
    }

    /// Create an empty store with a custom snapshot timeout.
    pub fn with_snapshot_timeout(snapshot_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            snapshot_timeout,
        }
    }

    /// Atomically replace the held frame. Writer side, called only by the
    /// ingestion task. Returns the new frame's generation (starting at 1).
    pub async fn replace(&self, data: Bytes) -> u64 {
        let mut state = self.state.lock().await;
        state.generation += 1;
        let generation = state.generation;
        state.frame = Some(Frame::new(data, generation));
        generation
    }

    /// Take a point-in-time copy of the current frame.
    ///
    /// Returns `None` when the store is empty or when the guard could not
    /// be acquired within the snapshot timeout. The copy is a
    /// reference-counted share of the stored buffer, so it stays valid
    /// after the next `replace`.
    pub async fn snapshot(&self) -> Option<Frame> {
        match timeout(self.snapshot_timeout, self.state.lock()).await {
            Ok(state) => state.frame.clone(),
            Err(_) => {
                tracing::trace!("frame store busy, skipping snapshot this tick");
                None
            }
        }
    }

    /// Generation of the currently held frame, 0 when empty.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_empty_store_snapshot() {
        let store = FrameStore::new();
        assert!(store.snapshot().await.is_none());
        assert_eq!(store.generation().await, 0);
    }

    #[tokio::test]
    async fn test_replace_and_snapshot() {
        let store = FrameStore::new();

        let gen1 = store.replace(Bytes::from_static(b"first")).await;
        assert_eq!(gen1, 1);

        let frame = store.snapshot().await.unwrap();
        assert_eq!(frame.data.as_ref(), b"first");
        assert_eq!(frame.generation, 1);

        let gen2 = store.replace(Bytes::from_static(b"second")).await;
        assert_eq!(gen2, 2);

        // The old snapshot keeps its buffer after the swap.
        assert_eq!(frame.data.as_ref(), b"first");
        let frame2 = store.snapshot().await.unwrap();
        assert_eq!(frame2.data.as_ref(), b"second");
    }

    /// Concurrent replace/snapshot hammering: a snapshot must never observe
    /// a torn frame. Each frame is filled with a single byte derived from
    /// its sequence number, so any mixing of two writes is detectable.
    #[tokio::test]
    async fn test_no_torn_frames_under_concurrency() {
        let store = Arc::new(FrameStore::new());

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0u32..200 {
                    let fill = (i % 251) as u8;
                    store.replace(Bytes::from(vec![fill; 4096])).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            readers.push(tokio::spawn(async move {
                let mut last_generation = 0u64;
                for _ in 0..200 {
                    if let Some(frame) = store.snapshot().await {
                        assert_eq!(frame.len(), 4096);
                        let first = frame.data[0];
                        assert!(frame.data.iter().all(|&b| b == first), "torn frame observed");
                        assert!(frame.generation >= last_generation, "generation went backwards");
                        last_generation = frame.generation;
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_snapshot_times_out_instead_of_blocking() {
        let store = Arc::new(FrameStore::with_snapshot_timeout(Duration::from_millis(10)));
        store.replace(Bytes::from_static(b"held")).await;

        // Hold the guard across the reader's entire timeout window.
        let guard = store.state.lock().await;
        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.snapshot().await })
        };

        let result = reader.await.unwrap();
        assert!(result.is_none());
        drop(guard);

        // Next attempt succeeds once the guard is free.
        assert!(store.snapshot().await.is_some());
    }
}
