//! Cuts a TCP byte stream into candidate frames.
//!
//! TCP gives no message boundaries: one read may carry half a frame, or three
//! frames back to back.  [`FrameAssembler`] buffers reads and hands out one
//! candidate at a time using the declared length field, whatever the header
//! byte says.  It does not classify packets; every chunk still goes through
//! [`validate`](super::frame::validate), which rejects unknown headers.
//!
//! A pending frame whose length field is garbage could otherwise hold the
//! stream forever.  While the head of the buffer is incomplete, the assembler
//! looks for a later header byte that starts a complete frame with a matching
//! checksum.  If one is found, everything before it is cut off as one chunk
//! and the stream continues from there.

use thiserror::Error;

use crate::protocol::checksum::checksum16;
use crate::protocol::frame::{declared_frame_len, CRC_LEN, HEADER_DATA, HEADER_IGNORABLE};

/// Errors raised while buffering stream data.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerError {
    /// Buffered bytes would exceed the configured cap; the buffer was cleared.
    #[error("reassembly buffer overflow: {buffered} bytes exceeds limit of {limit}")]
    Overflow { buffered: usize, limit: usize },
}

/// Per-connection reassembly buffer.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    max_len: usize,
}

impl FrameAssembler {
    /// Creates an assembler that holds at most `max_len` unconsumed bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
        }
    }

    /// Appends freshly read bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::Overflow`] when the buffered data would grow
    /// past the cap.  All buffered bytes (including `data`) are discarded.
    pub fn push(&mut self, data: &[u8]) -> Result<(), AssemblerError> {
        let buffered = self.buf.len() + data.len();
        if buffered > self.max_len {
            self.buf.clear();
            return Err(AssemblerError::Overflow {
                buffered,
                limit: self.max_len,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Removes and returns the next candidate frame, if one is complete.
    ///
    /// Packets are cut by their declared length, including packets with an
    /// unknown header.  When the head is still incomplete but a later intact
    /// frame is buffered, the stale bytes in front of it are returned as one
    /// chunk so the caller can log and drop them.
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }

        if let Some(total) = declared_frame_len(&self.buf) {
            if self.buf.len() >= total {
                return Some(self.buf.drain(..total).collect());
            }
        }

        let resync = self.resync_point()?;
        Some(self.buf.drain(..resync).collect())
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Offset of the first later frame that is complete and checksums.
    fn resync_point(&self) -> Option<usize> {
        (1..self.buf.len()).find(|&at| is_header(self.buf[at]) && is_intact(&self.buf[at..]))
    }
}

fn is_header(byte: u8) -> bool {
    byte == HEADER_DATA || byte == HEADER_IGNORABLE
}

/// Whether `buf` starts with a complete frame whose trailing CRC matches,
/// regardless of body length.
fn is_intact(buf: &[u8]) -> bool {
    let Some(total) = declared_frame_len(buf) else {
        return false;
    };
    if buf.len() < total {
        return false;
    }
    let covered = total - CRC_LEN;
    checksum16(buf, 0, covered) == u16::from_le_bytes([buf[covered], buf[covered + 1]])
}
