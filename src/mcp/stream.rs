//! Framed message I/O over an arbitrary byte channel.
//!
//! [`FramedStream`] owns the read and write halves of one connection together
//! with its [`FrameBuffer`]. It reads in fixed-size chunks until the buffer
//! yields a complete payload and writes frames out completely, retrying on
//! interruption and on zero-length writes.
//!
//! Deadlines, when configured, bound each individual read or write call the
//! way socket receive/send timeouts do. A peer that keeps making progress is
//! never cut off mid-frame; one that stops reading or writing is disconnected
//! instead of pinning the connection forever.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::TransportError;
use crate::mcp::framing::{encode_header, FrameBuffer};

/// Bytes requested from the channel per read call.
pub const READ_CHUNK_SIZE: usize = 4096;

/// A connection's framed reader/writer pair.
#[derive(Debug)]
pub struct FramedStream<R, W> {
    reader: R,
    writer: W,
    buffer: FrameBuffer,
    scratch: Vec<u8>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<R, W> FramedStream<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps a reader/writer pair with no deadlines.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: FrameBuffer::new(),
            scratch: vec![0; READ_CHUNK_SIZE],
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Sets per-operation read and write deadlines.
    #[must_use]
    pub fn with_timeouts(
        mut self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Bytes received but not yet returned as a message.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reads the next complete message payload.
    ///
    /// Returns `Ok(None)` at end of stream. Bytes of an unfinished frame left
    /// at end of stream are discarded.
    ///
    /// Cancel safety: dropping the returned future loses no received bytes.
    ///
    /// # Errors
    ///
    /// Returns a framing error for unframeable input, [`TransportError::Read`]
    /// for non-retryable read failures, and [`TransportError::ReadTimeout`]
    /// if the peer sends nothing within the read deadline.
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            if let Some(payload) = self.buffer.next_frame()? {
                return Ok(Some(payload));
            }

            if self.fill_buffer().await? == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        discarded = self.buffer.len(),
                        "End of stream inside an incomplete frame"
                    );
                }
                return Ok(None);
            }
        }
    }

    /// Reads one chunk from the channel into the frame buffer.
    ///
    /// Returns the number of bytes read; `0` means end of stream. No frame is
    /// extracted here, so a caller can wait for the first byte of a message
    /// separately from reading the rest of it.
    ///
    /// Cancel safety: dropping the returned future loses no received bytes.
    ///
    /// # Errors
    ///
    /// Same as [`read_message`](Self::read_message), except that only a
    /// buffer overflow can be reported as a framing error.
    pub async fn fill_buffer(&mut self) -> Result<usize, TransportError> {
        let read = read_chunk(&mut self.reader, &mut self.scratch);
        let n = with_deadline(self.read_timeout, read)
            .await
            .map_err(TransportError::ReadTimeout)??;
        self.buffer.extend(&self.scratch[..n])?;
        Ok(n)
    }

    /// Frames and writes one payload, then flushes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Write`] for non-retryable write failures and
    /// [`TransportError::WriteTimeout`] if a single write or flush call makes
    /// no progress within the write deadline. A large frame drained slowly
    /// but steadily may take longer than the deadline in total.
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let header = encode_header(payload.len());
        write_fully(&mut self.writer, &header, self.write_timeout).await?;
        write_fully(&mut self.writer, payload, self.write_timeout).await?;
        flush(&mut self.writer, self.write_timeout).await
    }

    /// Signals that no more data will be sent.
    ///
    /// Errors are logged and otherwise ignored: the connection is going away.
    pub async fn shutdown(&mut self) {
        match with_deadline(self.write_timeout, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Shutdown of write half failed"),
            Err(limit) => tracing::debug!(?limit, "Shutdown of write half timed out"),
        }
    }
}

/// Runs `future` under an optional deadline, returning the deadline on expiry.
async fn with_deadline<F: Future>(limit: Option<Duration>, future: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| limit),
        None => Ok(future.await),
    }
}

async fn read_chunk<R>(reader: &mut R, scratch: &mut [u8]) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.read(scratch).await {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                tracing::trace!("Read interrupted, retrying");
            }
            Err(source) => return Err(TransportError::Read { source }),
        }
    }
}

async fn flush<W>(writer: &mut W, limit: Option<Duration>) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let flushed = with_deadline(limit, writer.flush())
            .await
            .map_err(TransportError::WriteTimeout)?;
        match flushed {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(source) => return Err(TransportError::Write { source }),
        }
    }
}

async fn write_fully<W>(
    writer: &mut W,
    mut buf: &[u8],
    limit: Option<Duration>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut stalled_since: Option<Instant> = None;

    while !buf.is_empty() {
        let written = with_deadline(limit, writer.write(buf))
            .await
            .map_err(TransportError::WriteTimeout)?;
        match written {
            Ok(0) => {
                // Not end-of-stream for writes; give the channel a chance to drain.
                let since = *stalled_since.get_or_insert_with(Instant::now);
                if let Some(limit) = limit {
                    if since.elapsed() >= limit {
                        return Err(TransportError::WriteTimeout(limit));
                    }
                }
                tracing::trace!("Zero-length write, retrying");
                tokio::task::yield_now().await;
            }
            Ok(n) => {
                buf = &buf[n..];
                stalled_since = None;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                tracing::trace!("Write interrupted, retrying");
            }
            Err(source) => return Err(TransportError::Write { source }),
        }
    }
    Ok(())
}
