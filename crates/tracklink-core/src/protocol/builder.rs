//! Frame encoder.
//!
//! Produces byte-exact frames from tag values.  The server never sends frames
//! to devices; this exists so tests, benches and simulators can speak the
//! protocol without hand-assembling bytes.

use crate::protocol::checksum::checksum16;
use crate::protocol::frame::{ARCHIVE_FLAG, HEADER_DATA, HEADER_IGNORABLE, LENGTH_MASK};
use crate::protocol::tags::{tag, IDENTITY_LEN};

/// Builder for a single frame.
///
/// # Examples
///
/// ```rust
/// use tracklink_core::{decode, validate, FrameBuilder, Validated};
///
/// let bytes = FrameBuilder::data()
///     .identity("860000000000001")
///     .coordinates(51.123456, -0.654321)
///     .build();
///
/// let Ok(Validated::Data(frame)) = validate(&bytes) else { panic!() };
/// let record = decode(frame.body());
/// assert_eq!(record.identity.as_deref(), Some("860000000000001"));
/// ```
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    header: u8,
    archive_pending: bool,
    body: Vec<u8>,
}

impl FrameBuilder {
    /// Starts a data packet (`0x01`).
    pub fn data() -> Self {
        Self {
            header: HEADER_DATA,
            archive_pending: false,
            body: Vec::new(),
        }
    }

    /// Starts an ignorable packet (`0x15`).
    pub fn ignorable() -> Self {
        Self {
            header: HEADER_IGNORABLE,
            ..Self::data()
        }
    }

    /// Sets the unsent-archive flag in the length field.
    pub fn archive_pending(mut self, pending: bool) -> Self {
        self.archive_pending = pending;
        self
    }

    /// Identity tag; truncated or NUL-padded to 15 bytes.
    pub fn identity(mut self, identity: &str) -> Self {
        let mut value = [0u8; IDENTITY_LEN];
        let src = identity.as_bytes();
        let n = src.len().min(IDENTITY_LEN);
        value[..n].copy_from_slice(&src[..n]);
        self.body.push(tag::IDENTITY);
        self.body.extend_from_slice(&value);
        self
    }

    pub fn device_number(self, number: u16) -> Self {
        self.tag(tag::DEVICE_NUMBER, &number.to_le_bytes())
    }

    pub fn archive_count(self, count: u16) -> Self {
        self.tag(tag::ARCHIVE_COUNT, &count.to_le_bytes())
    }

    /// Datetime tag in seconds since the Unix epoch.
    pub fn datetime(self, unix_secs: u32) -> Self {
        self.tag(tag::DATETIME, &unix_secs.to_le_bytes())
    }

    pub fn milliseconds(self, ms: u16) -> Self {
        self.tag(tag::MILLISECONDS, &ms.to_le_bytes())
    }

    /// Coordinates tag; degrees are rounded to six decimal digits.
    pub fn coordinates(self, latitude: f64, longitude: f64) -> Self {
        let lat = (latitude * 1_000_000.0).round() as i32;
        let lon = (longitude * 1_000_000.0).round() as i32;
        let mut value = [0u8; 8];
        value[..4].copy_from_slice(&lat.to_le_bytes());
        value[4..].copy_from_slice(&lon.to_le_bytes());
        self.tag(tag::COORDINATES, &value)
    }

    /// Speed/heading tag from raw tenths (km/h and degrees).
    pub fn speed_heading(self, speed_tenths: u16, heading_tenths: u16) -> Self {
        let mut value = [0u8; 4];
        value[..2].copy_from_slice(&speed_tenths.to_le_bytes());
        value[2..].copy_from_slice(&heading_tenths.to_le_bytes());
        self.tag(tag::SPEED_HEADING, &value)
    }

    pub fn altitude(self, meters: u16) -> Self {
        self.tag(tag::ALTITUDE, &meters.to_le_bytes())
    }

    pub fn hdop(self, hdop: u8) -> Self {
        self.tag(tag::HDOP, &[hdop])
    }

    pub fn status(self, status: u16) -> Self {
        self.tag(tag::STATUS, &status.to_le_bytes())
    }

    pub fn supply_voltage(self, millivolts: u16) -> Self {
        self.tag(tag::SUPPLY_VOLTAGE, &millivolts.to_le_bytes())
    }

    pub fn battery_voltage(self, millivolts: u16) -> Self {
        self.tag(tag::BATTERY_VOLTAGE, &millivolts.to_le_bytes())
    }

    pub fn inputs(self, mask: u16) -> Self {
        self.tag(tag::INPUTS, &mask.to_le_bytes())
    }

    /// Input voltage tag for input 0 or 1; other indices are ignored.
    pub fn input_voltage(self, input: u8, millivolts: u16) -> Self {
        if input > 1 {
            return self;
        }
        self.tag(tag::INPUT_VOLTAGE_0 + input, &millivolts.to_le_bytes())
    }

    /// User data tag for slot 0 through 4; other slots are ignored.
    pub fn user_data(self, slot: u8, value: i32) -> Self {
        if slot > tag::USER_DATA_4 - tag::USER_DATA_0 {
            return self;
        }
        self.tag(tag::USER_DATA_0 + slot, &value.to_le_bytes())
    }

    /// Appends raw bytes to the body, e.g. an unknown tag.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(bytes);
        self
    }

    /// Encodes the frame with its length field and trailing CRC.
    ///
    /// Bodies longer than `0x7FFF` bytes are truncated to fit the length field.
    pub fn build(self) -> Vec<u8> {
        let body_len = self.body.len().min(usize::from(LENGTH_MASK));
        let mut len_field = body_len as u16;
        if self.archive_pending {
            len_field |= ARCHIVE_FLAG;
        }

        let mut buf = Vec::with_capacity(3 + body_len + 2);
        buf.push(self.header);
        buf.extend_from_slice(&len_field.to_le_bytes());
        buf.extend_from_slice(&self.body[..body_len]);
        let crc = checksum16(&buf, 0, buf.len());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    fn tag(mut self, t: u8, value: &[u8]) -> Self {
        self.body.push(t);
        self.body.extend_from_slice(value);
        self
    }
}
