//! Content-Length message framing.
//!
//! Every message on the wire is a single header field followed by a blank
//! line and the raw payload:
//!
//! ```text
//! Content-Length: 47\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":"1","method":"initialize"}
//! ```
//!
//! [`FrameBuffer`] accumulates bytes as they arrive and hands out one complete
//! payload at a time. It performs no I/O; see [`crate::mcp::stream`] for the
//! adapter that feeds it.

use crate::error::FramingError;

/// Largest payload a peer may declare.
pub const MAX_MESSAGE_SIZE: usize = 10_000_000;

/// Ceiling on bytes held that do not belong to a frame whose header has
/// already been accepted.
pub const MAX_BUFFER_SIZE: usize = 10_000_000;

/// The only header field accepted.
pub const CONTENT_LENGTH: &str = "Content-Length";

const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

/// Per-connection accumulation of not-yet-framed bytes.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    /// Bytes already searched for the header delimiter without success.
    scanned: usize,
    /// Body bounds of the frame at the front once its header is accepted.
    frame: Option<FrameBounds>,
}

#[derive(Debug, Clone, Copy)]
struct FrameBounds {
    body_start: usize,
    body_end: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            frame: None,
        }
    }

    /// Number of buffered bytes not yet handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Appends freshly read bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::BufferOverflow`] if the bytes held beyond an
    /// accepted frame would exceed [`MAX_BUFFER_SIZE`]. Nothing is appended
    /// in that case.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        let total = self.pending.len().saturating_add(bytes.len());
        let reserved = self.frame.map_or(0, |frame| frame.body_end);
        let size = total.saturating_sub(reserved);
        if size > MAX_BUFFER_SIZE {
            return Err(FramingError::BufferOverflow {
                size,
                max: MAX_BUFFER_SIZE,
            });
        }

        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    /// Extracts the next complete payload, if one is buffered.
    ///
    /// Returns `Ok(None)` when more input is needed. On success the header,
    /// delimiter and payload are consumed; trailing bytes stay buffered.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the header is malformed or declares a
    /// payload larger than [`MAX_MESSAGE_SIZE`].
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let frame = match self.frame {
            Some(frame) => frame,
            None => {
                let Some(header_end) = self.find_header_end() else {
                    return Ok(None);
                };
                let length = parse_header(&self.pending[..header_end])?;
                let body_start = header_end + HEADER_DELIMITER.len();
                let frame = FrameBounds {
                    body_start,
                    body_end: body_start + length,
                };
                self.frame = Some(frame);
                frame
            }
        };

        if self.pending.len() < frame.body_end {
            return Ok(None);
        }

        let payload = self.pending[frame.body_start..frame.body_end].to_vec();
        self.pending.drain(..frame.body_end);
        self.scanned = 0;
        self.frame = None;
        Ok(Some(payload))
    }

    fn find_header_end(&mut self) -> Option<usize> {
        // A delimiter may straddle the previously scanned region.
        let start = self.scanned.saturating_sub(HEADER_DELIMITER.len() - 1);
        let found = find_delimiter(&self.pending[start..]).map(|pos| start + pos);
        if found.is_none() {
            self.scanned = self.pending.len();
        }
        found
    }
}

/// Frames a payload for the wire.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = encode_header(payload.len());
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    frame
}

/// Header bytes (including the blank line) for a payload of `len` bytes.
#[must_use]
pub fn encode_header(len: usize) -> Vec<u8> {
    format!("{CONTENT_LENGTH}: {len}\r\n\r\n").into_bytes()
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_DELIMITER.len())
        .position(|window| window == HEADER_DELIMITER)
}

fn parse_header(header: &[u8]) -> Result<usize, FramingError> {
    let text = std::str::from_utf8(header).map_err(|_| FramingError::MalformedHeader {
        reason: "header is not valid UTF-8".to_string(),
    })?;

    if text.contains("\r\n") {
        return Err(FramingError::MalformedHeader {
            reason: "expected a single header field".to_string(),
        });
    }

    let (name, value) = text
        .split_once(':')
        .ok_or_else(|| FramingError::MalformedHeader {
            reason: "header field has no ':' separator".to_string(),
        })?;

    if name.trim() != CONTENT_LENGTH {
        return Err(FramingError::MalformedHeader {
            reason: format!("unexpected header field {:?}", name.trim()),
        });
    }

    parse_content_length(value.trim())
}

fn parse_content_length(value: &str) -> Result<usize, FramingError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FramingError::InvalidContentLength {
            value: value.to_string(),
        });
    }

    // All digits: anything that fails to parse is simply too big.
    let declared = value.parse::<u64>().unwrap_or(u64::MAX);
    match usize::try_from(declared) {
        Ok(length) if length <= MAX_MESSAGE_SIZE => Ok(length),
        _ => Err(FramingError::ContentTooLarge {
            declared,
            max: MAX_MESSAGE_SIZE,
        }),
    }
}
