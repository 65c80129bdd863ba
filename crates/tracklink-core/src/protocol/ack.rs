//! Acknowledgement replies.
//!
//! A device considers a frame delivered once it receives `0x02` followed by
//! the last two bytes of that frame (normally its checksum).

/// First byte of every acknowledgement.
pub const ACK_MARKER: u8 = 0x02;

/// Builds the three-byte acknowledgement for `frame`.
///
/// Frames shorter than two bytes are acknowledged with two zero bytes.
///
/// # Examples
///
/// ```rust
/// use tracklink_core::build_ack;
///
/// assert_eq!(build_ack(&[0x01, 0x00, 0x00, 0xAB, 0xCD]), [0x02, 0xAB, 0xCD]);
/// assert_eq!(build_ack(&[0x01]), [0x02, 0x00, 0x00]);
/// ```
pub fn build_ack(frame: &[u8]) -> [u8; 3] {
    match frame {
        [.., a, b] => [ACK_MARKER, *a, *b],
        _ => [ACK_MARKER, 0x00, 0x00],
    }
}
