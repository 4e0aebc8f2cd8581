//! Per-connection byte buffering and frame extraction.
//!
//! [`FrameBuffer`] is a growable contiguous buffer with a consumed-prefix
//! cursor: bytes `[0, read_pos)` belong to frames already handed out,
//! bytes `[read_pos, len)` are unparsed. The consumed prefix is dropped by
//! compaction before new bytes are appended, so the buffer never grows
//! past its cap while frames are being drained promptly.
//!
//! [`FrameReader`] drives the grammar in [`super::resp`] over the unparsed
//! region. `try_next` is pure: calling it repeatedly without `advance`
//! returns the same result, and neither an incomplete nor a malformed
//! buffer is mutated.

use crate::config::ParserLimits;
use crate::value::Frame;

use super::{resp, Error, Result};

/// Growable contiguous byte buffer with a consumed-prefix cursor and a
/// hard size cap.
struct FrameBuffer {
    data: Vec<u8>,
    read_pos: usize,
    max_bytes: usize,
}

impl FrameBuffer {
    fn new(max_bytes: usize) -> Self {
        Self { data: Vec::new(), read_pos: 0, max_bytes }
    }

    /// The unparsed region.
    fn unparsed(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    fn unparsed_len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// Appends bytes, dropping the consumed prefix first. Fails without
    /// mutating when the unparsed bytes would exceed the cap.
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.unparsed_len() + bytes.len() > self.max_bytes {
            return Err(Error::BufferOverflow);
        }
        self.compact();
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Marks `n` unparsed bytes as consumed.
    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.unparsed_len());
        self.read_pos += n;
    }

    /// Moves the unparsed region to offset 0 and drops the prefix.
    fn compact(&mut self) {
        if self.read_pos > 0 {
            let len = self.data.len();
            self.data.copy_within(self.read_pos..len, 0);
            self.data.truncate(len - self.read_pos);
            self.read_pos = 0;
        }
    }
}

/// Presents successive complete RESP frames out of fragmented reads.
pub struct FrameReader {
    buffer: FrameBuffer,
    limits: ParserLimits,
}

impl FrameReader {
    /// Creates a reader with the given buffer cap and grammar limits.
    pub fn new(max_buffer_bytes: usize, limits: ParserLimits) -> Self {
        Self { buffer: FrameBuffer::new(max_buffer_bytes), limits }
    }

    /// Extends the buffer with freshly read bytes.
    ///
    /// Returns [`Error::BufferOverflow`] when the unparsed bytes would
    /// exceed the configured cap; the buffer is left unchanged.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.append(bytes)
    }

    /// Attempts to parse one complete frame from the head of the unparsed
    /// region.
    ///
    /// `Ok(Some(frame))` leaves the buffer untouched; the caller owns the
    /// decision to [`advance`](Self::advance) past `frame.consumed()`
    /// bytes. `Ok(None)` means more bytes are needed. `Err` means the
    /// buffer head can never become a valid frame.
    pub fn try_next(&self) -> Result<Option<Frame>> {
        let unparsed = self.buffer.unparsed();
        match resp::value(unparsed, 0, &self.limits, 0)? {
            Some((consumed, value)) => {
                Ok(Some(Frame { value, raw: unparsed[..consumed].to_vec() }))
            }
            None => Ok(None),
        }
    }

    /// Consumes `n` bytes after a successful parse. Compaction is deferred
    /// to the next `append`.
    pub fn advance(&mut self, n: usize) {
        self.buffer.consume(n);
    }

    /// Bytes currently buffered but not yet parsed.
    pub fn unparsed_len(&self) -> usize {
        self.buffer.unparsed_len()
    }
}
