//! Viewer streaming endpoint
//!
//! A deliberately small HTTP/1.1 surface:
//!
//! - `GET /` — static index page embedding the stream
//! - `GET /stream` — long-lived `multipart/x-mixed-replace` response
//!
//! Each viewer session is its own task and only ever touches the
//! [`FrameStore`], pulling a snapshot per pacing tick. An empty store is a
//! bounded idle loop, not an error: the session waits a tick and retries.
//! Any write failure ends the session; other sessions and ingestion are
//! unaffected.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::frame::Frame;
use crate::stats::HubStats;
use crate::store::FrameStore;

/// Multipart boundary token declared in the stream content type.
pub const BOUNDARY: &str = "frame";

/// Cap on the request head we are willing to buffer.
const MAX_REQUEST_HEAD: usize = 4096;

const INDEX_BODY: &str = "<!DOCTYPE html>\n\
<html><head><title>meshcam</title></head>\n\
<body><h1>meshcam</h1><img src=\"/stream\" alt=\"live\"></body></html>\n";

/// Serve one viewer connection to completion.
pub async fn handle_viewer(
    mut socket: TcpStream,
    store: Arc<FrameStore>,
    pacing: Duration,
    stats: Arc<HubStats>,
) {
    let path = match read_request_path(&mut socket).await {
        Ok(Some(path)) => path,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read viewer request");
            return;
        }
    };

    let result = match path.as_str() {
        "/" | "/index.html" => write_index(&mut socket).await,
        "/stream" => {
            stats.viewer_started();
            let r = stream_parts(&mut socket, &store, pacing).await;
            stats.viewer_finished();
            r
        }
        _ => write_not_found(&mut socket).await,
    };

    if let Err(e) = result {
        tracing::debug!(path = %path, error = %e, "viewer session ended");
    }
    let _ = socket.shutdown().await;
}

/// Read the request head and return the path of the request line.
///
/// Returns `Ok(None)` when the peer closes before sending a full head or
/// sends something that is not a GET. Oversized heads are treated the same
/// way: the connection is simply dropped.
async fn read_request_path<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(512);
    let mut buf = [0u8; 512];

    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        if head.len() > MAX_REQUEST_HEAD {
            return Ok(None);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head);
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(path)) => Ok(Some(path.to_string())),
        _ => Ok(None),
    }
}

async fn write_index<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        INDEX_BODY.len(),
        INDEX_BODY
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

async fn write_not_found<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        .await?;
    writer.flush().await
}

/// The unbounded part loop behind `/stream`.
///
/// Runs until a write fails or the task is dropped with its connection.
async fn stream_parts<W>(writer: &mut W, store: &FrameStore, pacing: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_stream_preamble(writer).await?;

    let mut ticker = tokio::time::interval(pacing);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_generation = 0u64;

    loop {
        ticker.tick().await;
        match store.snapshot().await {
            Some(frame) => {
                // Re-sending the current frame keeps idle viewers painted,
                // but log only on change.
                if frame.generation != last_generation {
                    tracing::trace!(generation = frame.generation, len = frame.len(), "emitting part");
                    last_generation = frame.generation;
                }
                write_part(writer, &frame).await?;
            }
            None => continue,
        }
    }
}

async fn write_stream_preamble<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let preamble = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\r\n\
         --{}\r\n",
        BOUNDARY, BOUNDARY
    );
    writer.write_all(preamble.as_bytes()).await?;
    writer.flush().await
}

/// Emit one part: length-bearing header, raw frame bytes, boundary.
async fn write_part<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!(
        "Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&frame.data).await?;
    writer
        .write_all(format!("\r\n--{}\r\n", BOUNDARY).as_bytes())
        .await?;
    writer.flush().await
}
