//! Validated image frame
//!
//! A [`Frame`] only ever comes out of the ingestion protocol fully
//! received; partial reads are discarded before one is ever constructed.
//! Cloning is cheap because `Bytes` is reference counted, which is what
//! makes store snapshots safe to hand to every viewer session.

use bytes::Bytes;

/// One complete, validated image payload.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw image bytes (zero-copy via reference counting)
    pub data: Bytes,
    /// Monotonically increasing version counter, assigned by the store
    pub generation: u64,
}

impl Frame {
    /// Construct a frame with the given generation.
    pub fn new(data: Bytes, generation: u64) -> Self {
        Self { data, generation }
    }

    /// Byte length of the payload.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty. Never true for ingested frames.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len() {
        let frame = Frame::new(Bytes::from_static(b"\xff\xd8\xff"), 7);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.generation, 7);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_clone_shares_buffer() {
        let frame = Frame::new(Bytes::from(vec![0xAB; 1024]), 1);
        let copy = frame.clone();
        // Same allocation, not a deep copy.
        assert_eq!(copy.data.as_ptr(), frame.data.as_ptr());
    }
}
