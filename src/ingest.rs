//! Frame ingestion protocol
//!
//! Wire format, one frame at a time on the ingestion connection:
//!
//! ```text
//! +----------------------------+----------------------+
//! | length: u32 big-endian (4) | payload (length)     |
//! +----------------------------+----------------------+
//! ```
//!
//! The declared length must satisfy `0 < length <= 5 MiB`. Violations are
//! protocol errors: the connection is closed and nothing partial is kept.
//! A short read anywhere discards the partially accumulated buffer — it is
//! never promoted to a frame.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Hard cap on a declared frame length (5 MiB).
pub const MAX_FRAME_LEN: usize = 5 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Errors from reading one frame off the ingestion connection.
#[derive(Debug)]
pub enum IngestError {
    /// Connection closed cleanly or mid-prefix
    Closed,
    /// Declared length was zero
    ZeroLength,
    /// Declared length exceeds [`MAX_FRAME_LEN`]
    FrameTooLarge(u32),
    /// I/O failure mid-frame
    Io(io::Error),
}

impl IngestError {
    /// Whether this is a protocol violation (as opposed to an ordinary
    /// transport failure or clean close).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, IngestError::ZeroLength | IngestError::FrameTooLarge(_))
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Closed => write!(f, "ingestion connection closed"),
            IngestError::ZeroLength => write!(f, "declared frame length is zero"),
            IngestError::FrameTooLarge(len) => {
                write!(f, "declared frame length {} exceeds cap {}", len, MAX_FRAME_LEN)
            }
            IngestError::Io(e) => write!(f, "ingestion I/O error: {}", e),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Read exactly one length-prefixed frame.
///
/// Blocks only within a frame boundary: once a valid length is read, the
/// call completes the body or fails. On success the returned buffer holds
/// exactly the declared number of bytes.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, IngestError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LEN_PREFIX_SIZE];
    if let Err(e) = reader.read_exact(&mut prefix).await {
        // A short prefix read means the producer went away between frames.
        return match e.kind() {
            io::ErrorKind::UnexpectedEof => Err(IngestError::Closed),
            _ => Err(IngestError::Io(e)),
        };
    }

    let declared = u32::from_be_bytes(prefix);
    if declared == 0 {
        return Err(IngestError::ZeroLength);
    }
    if declared as usize > MAX_FRAME_LEN {
        return Err(IngestError::FrameTooLarge(declared));
    }

    let len = declared as usize;
    let mut body = BytesMut::zeroed(len);
    if let Err(e) = reader.read_exact(&mut body).await {
        // Partial body: the buffer drops here and is never seen again.
        return match e.kind() {
            io::ErrorKind::UnexpectedEof => Err(IngestError::Closed),
            _ => Err(IngestError::Io(e)),
        };
    }

    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut wire = (payload.len() as u32).to_be_bytes().to_vec();
        wire.extend_from_slice(payload);
        wire
    }

    #[tokio::test]
    async fn test_read_valid_frame() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&framed(b"\xff\xd8jpeg-ish\xff\xd9"))
            .build();

        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame.as_ref(), b"\xff\xd8jpeg-ish\xff\xd9");
    }

    #[tokio::test]
    async fn test_read_frame_split_across_chunks() {
        // Prefix and body arriving in separate reads must still assemble.
        let payload = vec![0xFF; 1000];
        let wire = framed(&payload);
        let mut reader = tokio_test::io::Builder::new()
            .read(&wire[..2])
            .read(&wire[2..6])
            .read(&wire[6..500])
            .read(&wire[500..])
            .build();

        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame.len(), 1000);
        assert!(frame.iter().all(|&b| b == 0xFF));
    }

    #[tokio::test]
    async fn test_zero_length_is_protocol_error() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x00])
            .build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, IngestError::ZeroLength));
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_oversized_length_is_protocol_error() {
        // 5 MiB + 1
        let declared = (MAX_FRAME_LEN as u32) + 1;
        let mut reader = tokio_test::io::Builder::new()
            .read(&declared.to_be_bytes())
            .build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, IngestError::FrameTooLarge(n) if n == declared));
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_exact_cap_is_accepted() {
        let payload = vec![0x42; MAX_FRAME_LEN];
        let wire = framed(&payload);
        let mut reader = tokio_test::io::Builder::new().read(&wire).build();

        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);
    }

    #[tokio::test]
    async fn test_short_prefix_is_closed() {
        let mut reader = tokio_test::io::Builder::new().read(&[0x00, 0x00]).build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, IngestError::Closed));
        assert!(!err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_short_body_is_closed() {
        let mut wire = 1000u32.to_be_bytes().to_vec();
        wire.extend_from_slice(&[0xAA; 400]); // 600 bytes short
        let mut reader = tokio_test::io::Builder::new().read(&wire).build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, IngestError::Closed));
    }

    #[tokio::test]
    async fn test_back_to_back_frames() {
        let mut wire = framed(b"one");
        wire.extend_from_slice(&framed(b"twoo"));
        let mut reader = tokio_test::io::Builder::new().read(&wire).build();

        assert_eq!(read_frame(&mut reader).await.unwrap().as_ref(), b"one");
        assert_eq!(read_frame(&mut reader).await.unwrap().as_ref(), b"twoo");
        assert!(matches!(
            read_frame(&mut reader).await.unwrap_err(),
            IngestError::Closed
        ));
    }
}
