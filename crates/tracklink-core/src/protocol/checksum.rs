//! CRC-16 checksum used to protect data frames.
//!
//! The algorithm is the reflected CRC-16 (polynomial `0x8005`, written in its
//! reflected form `0xA001`) with the register initialised to `0xFFFF` and no
//! final XOR.  This is the variant commonly catalogued as CRC-16/MODBUS.

/// Reflected form of the `0x8005` generator polynomial.
pub const CRC16_POLY: u16 = 0xA001;

/// Initial value of the CRC register.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Computes the CRC-16 of `length` bytes of `bytes` starting at `offset`.
///
/// The range is clamped to the slice, so an out-of-range `offset` or `length`
/// never panics; it simply covers fewer bytes.
///
/// # Examples
///
/// ```rust
/// use tracklink_core::checksum16;
///
/// assert_eq!(checksum16(b"123456789", 0, 9), 0x4B37);
/// ```
pub fn checksum16(bytes: &[u8], offset: usize, length: usize) -> u16 {
    let end = offset.saturating_add(length).min(bytes.len());
    let start = offset.min(end);

    let mut crc = CRC16_INIT;
    for &byte in &bytes[start..end] {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
