//! Length-prefixed JSON message framing for hashd peer streams.
//!
//! Every message on a peer stream is framed as:
//!
//! ```text
//! [4-byte big-endian payload length][UTF-8 encoded JSON payload]
//! ```
//!
//! Message boundaries are exact regardless of how the transport fragments
//! bytes: [`read_message`] accumulates chunks until precisely the declared
//! length has arrived, and [`write_message`] splits large frames into
//! bounded chunks, waiting for the sink to drain between them so a slow
//! stream is never overwhelmed.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Size of the big-endian length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Frames larger than this are written in successive chunks with a drain
/// wait between them.
pub const WRITE_CHUNK_LEN: usize = 64 * 1024;

/// Pause inserted between chunks of a large frame.
pub const INTER_CHUNK_PAUSE: Duration = Duration::from_millis(10);

/// Upper bound on a declared payload length.
///
/// The receive buffer is allocated up front from the header, so an absurd
/// declared length must be rejected before allocation.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Error raised while framing or deframing a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The stream ended inside the 4-byte length prefix.
    #[error("truncated frame header: got {got} of {FRAME_HEADER_LEN} bytes")]
    TruncatedHeader {
        /// Header bytes received before the stream ended.
        got: usize,
    },
    /// The declared payload length exceeds [`MAX_FRAME_LEN`].
    #[error("declared frame length {len} exceeds maximum {MAX_FRAME_LEN}")]
    Oversized {
        /// The declared payload length.
        len: usize,
    },
    /// The payload is not valid UTF-8.
    #[error("frame payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    /// The payload is not a valid message of the expected shape.
    #[error("frame payload is not a valid message: {0}")]
    Json(#[from] serde_json::Error),
    /// IO failure on the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a message and write it as a single length-prefixed frame.
///
/// Frames whose combined header + payload size exceeds [`WRITE_CHUNK_LEN`]
/// are written in successive chunks; after each chunk the sink is flushed
/// (the drain wait) and a short pause is inserted before the next chunk.
pub async fn write_message<W, T>(io: &mut W, message: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(CodecError::Oversized { len: payload.len() });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);

    if frame.len() <= WRITE_CHUNK_LEN {
        io.write_all(&frame).await?;
        io.flush().await?;
        return Ok(());
    }

    trace!(
        frame_len = frame.len(),
        chunks = frame.len().div_ceil(WRITE_CHUNK_LEN),
        "writing chunked frame"
    );
    let mut chunks = frame.chunks(WRITE_CHUNK_LEN).peekable();
    while let Some(chunk) = chunks.next() {
        io.write_all(chunk).await?;
        io.flush().await?;
        if chunks.peek().is_some() {
            tokio::time::sleep(INTER_CHUNK_PAUSE).await;
        }
    }
    Ok(())
}

/// Read one length-prefixed frame and decode it as a message.
///
/// Returns `Ok(None)` when the stream ends cleanly before a header byte
/// arrives, or when it ends before the declared payload length has been
/// received. A stream that ends inside the 4-byte header is a decode
/// failure ([`CodecError::TruncatedHeader`]), not a retryable condition.
pub async fn read_message<R, T>(io: &mut R) -> Result<Option<T>, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = io.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CodecError::TruncatedHeader { got: filled });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::Oversized { len });
    }

    let mut payload = vec![0u8; len];
    let mut received = 0;
    while received < len {
        let n = io.read(&mut payload[received..]).await?;
        if n == 0 {
            trace!(declared = len, received, "stream ended mid-frame");
            return Ok(None);
        }
        received += n;
    }

    let text = std::str::from_utf8(&payload)?;
    Ok(Some(serde_json::from_str(text)?))
}
