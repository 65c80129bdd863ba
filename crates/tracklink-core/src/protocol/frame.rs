//! Frame classification and validation.
//!
//! Wire format:
//! ```text
//! [header:1][length:2 LE][body:L][crc16:2 LE]
//! ```
//! `header` is `0x01` for data packets and `0x15` for ignorable packets.
//! Bit 15 of `length` is the "unsent archive data" flag, bits 14..0 are the
//! body length `L`.  The trailing CRC covers `[0, 3 + L)` and is only verified
//! when `L` reaches [`FramePolicy::checksum_threshold`].

use thiserror::Error;

use crate::protocol::checksum::checksum16;

/// Header byte of a data packet.
pub const HEADER_DATA: u8 = 0x01;

/// Header byte of an ignorable packet.
pub const HEADER_IGNORABLE: u8 = 0x15;

/// Header byte plus the 16-bit length field.
pub const PREFIX_LEN: usize = 3;

/// Size of the trailing checksum.
pub const CRC_LEN: usize = 2;

/// Bit of the length field that flags pending archive records.
pub const ARCHIVE_FLAG: u16 = 0x8000;

/// Bits of the length field holding the body length.
pub const LENGTH_MASK: u16 = 0x7FFF;

/// Largest frame the length field can declare.
pub const MAX_FRAME_LEN: usize = PREFIX_LEN + LENGTH_MASK as usize + CRC_LEN;

/// Body length from which the trailing checksum is verified.
pub const DEFAULT_CHECKSUM_THRESHOLD: usize = 32;

/// Errors produced while validating a frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than three bytes: no room for the header and length field.
    #[error("frame too short: {0} bytes, need at least {PREFIX_LEN}")]
    TooShort(usize),

    /// The header byte is neither a data nor an ignorable packet.
    #[error("unknown packet type: 0x{0:02X}")]
    UnknownPacketType(u8),

    /// The length field declares more bytes than the buffer holds.
    #[error("incomplete frame: expected {expected} bytes, got {available}")]
    Incomplete { expected: usize, available: usize },

    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch: calculated 0x{calculated:04X}, received 0x{received:04X}")]
    ChecksumMismatch { calculated: u16, received: u16 },
}

/// Tunable validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePolicy {
    /// Bodies shorter than this are accepted without checking the CRC.
    pub checksum_threshold: usize,
}

impl Default for FramePolicy {
    fn default() -> Self {
        Self {
            checksum_threshold: DEFAULT_CHECKSUM_THRESHOLD,
        }
    }
}

/// A validated data frame borrowed from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    bytes: &'a [u8],
    body_len: usize,
    has_unsent_archive: bool,
}

impl<'a> Frame<'a> {
    /// The complete frame, header through trailing checksum.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The tag stream between the length field and the checksum.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[PREFIX_LEN..PREFIX_LEN + self.body_len]
    }

    /// Declared body length `L`.
    pub fn body_len(&self) -> usize {
        self.body_len
    }

    /// Whether the device still holds archived records it has not sent.
    pub fn has_unsent_archive(&self) -> bool {
        self.has_unsent_archive
    }

    /// The trailing checksum as transmitted.
    pub fn checksum(&self) -> u16 {
        let at = PREFIX_LEN + self.body_len;
        u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]])
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validated<'a> {
    /// A data packet ready for the tag decoder.
    Data(Frame<'a>),
    /// An ignorable packet; carries no record but may still be acknowledged.
    Ignorable(&'a [u8]),
}

impl<'a> Validated<'a> {
    /// The raw bytes an acknowledgement should be derived from.
    pub fn bytes(&self) -> &'a [u8] {
        match self {
            Validated::Data(frame) => frame.bytes(),
            Validated::Ignorable(bytes) => bytes,
        }
    }
}

/// Total frame length declared by the prefix of `buf`, if the prefix is present.
///
/// Returns `None` when fewer than three bytes are available.  The header byte
/// is not inspected.
pub fn declared_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < PREFIX_LEN {
        return None;
    }
    let raw = u16::from_le_bytes([buf[1], buf[2]]);
    Some(PREFIX_LEN + usize::from(raw & LENGTH_MASK) + CRC_LEN)
}

/// Validates `buf` with the default [`FramePolicy`].
///
/// # Errors
///
/// Returns [`FrameError`] when the buffer is not an acceptable frame.
///
/// # Examples
///
/// ```rust
/// use tracklink_core::{validate, FrameBuilder, Validated};
///
/// let bytes = FrameBuilder::data().identity("860000000000001").build();
/// match validate(&bytes).unwrap() {
///     Validated::Data(frame) => assert_eq!(frame.body_len(), 16),
///     Validated::Ignorable(_) => unreachable!(),
/// }
/// ```
pub fn validate(buf: &[u8]) -> Result<Validated<'_>, FrameError> {
    validate_with(buf, &FramePolicy::default())
}

/// Validates `buf` against `policy`.
///
/// Trailing bytes past the declared frame length are ignored; callers that
/// read from a stream should cut frames with
/// [`FrameAssembler`](crate::protocol::assembler::FrameAssembler) first.
///
/// # Errors
///
/// Returns [`FrameError`] when the buffer is not an acceptable frame.
pub fn validate_with<'a>(buf: &'a [u8], policy: &FramePolicy) -> Result<Validated<'a>, FrameError> {
    if buf.len() < PREFIX_LEN {
        return Err(FrameError::TooShort(buf.len()));
    }

    match buf[0] {
        HEADER_DATA => {}
        HEADER_IGNORABLE => {
            // Ignorable packets are accepted on class alone.
            let end = declared_frame_len(buf).map_or(buf.len(), |n| n.min(buf.len()));
            return Ok(Validated::Ignorable(&buf[..end]));
        }
        other => return Err(FrameError::UnknownPacketType(other)),
    }

    let raw_len = u16::from_le_bytes([buf[1], buf[2]]);
    let body_len = usize::from(raw_len & LENGTH_MASK);
    let expected = PREFIX_LEN + body_len + CRC_LEN;
    if buf.len() < expected {
        return Err(FrameError::Incomplete {
            expected,
            available: buf.len(),
        });
    }

    let frame = Frame {
        bytes: &buf[..expected],
        body_len,
        has_unsent_archive: raw_len & ARCHIVE_FLAG != 0,
    };

    if body_len >= policy.checksum_threshold {
        let calculated = checksum16(buf, 0, PREFIX_LEN + body_len);
        let received = frame.checksum();
        if calculated != received {
            return Err(FrameError::ChecksumMismatch {
                calculated,
                received,
            });
        }
    }

    Ok(Validated::Data(frame))
}
