//! Tag table and body decoder.
//!
//! A frame body is a flat sequence of `(tag, value)` pairs.  The width of each
//! value is implied by the tag, so the decoder must know every tag it wants to
//! step over.
//!
//! Unknown tags are skipped by advancing exactly one byte (the tag byte
//! itself).  This keeps decoding going for zero-width tags, but an unknown tag
//! that does carry a value desynchronises the rest of the body.  Devices in the
//! field only send tags from this table, so the behaviour is kept as is.

use chrono::DateTime;
use tracing::{debug, trace};

use crate::protocol::frame::Frame;
use crate::record::{DecodedRecord, Extension, ExtensionValue};

/// Tag identifiers understood by the decoder.
pub mod tag {
    pub const IDENTITY: u8 = 0x03;
    pub const DEVICE_NUMBER: u8 = 0x04;
    pub const ARCHIVE_COUNT: u8 = 0x10;
    pub const DATETIME: u8 = 0x20;
    pub const MILLISECONDS: u8 = 0x21;
    pub const COORDINATES: u8 = 0x30;
    pub const SPEED_HEADING: u8 = 0x33;
    pub const ALTITUDE: u8 = 0x34;
    pub const HDOP: u8 = 0x35;
    pub const STATUS: u8 = 0x40;
    pub const SUPPLY_VOLTAGE: u8 = 0x41;
    pub const BATTERY_VOLTAGE: u8 = 0x42;
    pub const INPUTS: u8 = 0x46;
    pub const INPUT_VOLTAGE_0: u8 = 0x50;
    pub const INPUT_VOLTAGE_1: u8 = 0x51;
    pub const USER_DATA_0: u8 = 0xE2;
    pub const USER_DATA_4: u8 = 0xE6;
}

/// Width of the identity value.
pub const IDENTITY_LEN: usize = 15;

/// Returns the value width of a known tag, or `None` for unknown tags.
pub fn value_width(t: u8) -> Option<usize> {
    let width = match t {
        tag::IDENTITY => IDENTITY_LEN,
        tag::HDOP => 1,
        tag::DEVICE_NUMBER
        | tag::ARCHIVE_COUNT
        | tag::MILLISECONDS
        | tag::ALTITUDE
        | tag::STATUS
        | tag::SUPPLY_VOLTAGE
        | tag::BATTERY_VOLTAGE
        | tag::INPUTS
        | tag::INPUT_VOLTAGE_0
        | tag::INPUT_VOLTAGE_1 => 2,
        tag::DATETIME | tag::SPEED_HEADING => 4,
        tag::USER_DATA_0..=tag::USER_DATA_4 => 4,
        tag::COORDINATES => 8,
        _ => return None,
    };
    Some(width)
}

/// Decodes a validated data frame, carrying over its archive flag.
pub fn decode_frame(frame: &Frame<'_>) -> DecodedRecord {
    let mut record = decode(frame.body());
    record.has_unsent_archive = frame.has_unsent_archive();
    record
}

/// Decodes a frame body into a record.
///
/// Decoding never fails.  If a tag's value would run past the end of `body`
/// the walk stops and the fields gathered so far are returned.
///
/// # Examples
///
/// ```rust
/// use tracklink_core::decode;
///
/// let record = decode(&[0x33, 125, 0, 0x84, 0x03]);
/// assert_eq!(record.speed_kmh, Some(12.5));
/// assert_eq!(record.heading_deg, Some(90.0));
/// ```
pub fn decode(body: &[u8]) -> DecodedRecord {
    let mut record = DecodedRecord::default();
    let mut pos = 0;

    while pos < body.len() {
        let t = body[pos];
        let Some(width) = value_width(t) else {
            trace!(tag = format_args!("0x{t:02X}"), offset = pos, "skipping unknown tag");
            pos += 1;
            continue;
        };

        let start = pos + 1;
        let Some(value) = body.get(start..start + width) else {
            debug!(
                tag = format_args!("0x{t:02X}"),
                offset = pos,
                needed = width,
                available = body.len() - start,
                "tag value overruns body; returning partial record"
            );
            break;
        };

        apply(&mut record, t, value);
        pos = start + width;
    }

    record
}

fn apply(record: &mut DecodedRecord, t: u8, v: &[u8]) {
    match t {
        tag::IDENTITY => {
            let text = String::from_utf8_lossy(v);
            let trimmed = text.trim_matches(|c: char| c <= ' ');
            record.identity = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        }
        tag::DEVICE_NUMBER => {
            record.extensions.insert(
                Extension::DeviceNumber,
                ExtensionValue::Unsigned(u32::from(read_u16(v, 0))),
            );
        }
        tag::ARCHIVE_COUNT => record.archive_count = Some(read_u16(v, 0)),
        tag::DATETIME => {
            let secs = i64::from(read_u32(v, 0));
            record.timestamp = DateTime::from_timestamp(secs, 0);
        }
        tag::MILLISECONDS => {
            record.extensions.insert(
                Extension::Milliseconds,
                ExtensionValue::Unsigned(u32::from(read_u16(v, 0))),
            );
        }
        tag::COORDINATES => {
            record.latitude = Some(f64::from(read_i32(v, 0)) / 1_000_000.0);
            record.longitude = Some(f64::from(read_i32(v, 4)) / 1_000_000.0);
        }
        tag::SPEED_HEADING => {
            record.speed_kmh = Some(f64::from(read_u16(v, 0)) / 10.0);
            record.heading_deg = Some(f64::from(read_u16(v, 2)) / 10.0);
        }
        tag::ALTITUDE => record.altitude_m = Some(read_u16(v, 0)),
        tag::HDOP => {
            record
                .extensions
                .insert(Extension::Hdop, ExtensionValue::Unsigned(u32::from(v[0])));
        }
        tag::STATUS => record.status = Some(read_u16(v, 0)),
        tag::SUPPLY_VOLTAGE => record.supply_voltage = Some(millivolts(v)),
        tag::BATTERY_VOLTAGE => record.battery_voltage = Some(millivolts(v)),
        tag::INPUTS => {
            record.extensions.insert(
                Extension::Inputs,
                ExtensionValue::Unsigned(u32::from(read_u16(v, 0))),
            );
        }
        tag::INPUT_VOLTAGE_0 | tag::INPUT_VOLTAGE_1 => {
            record.extensions.insert(
                Extension::InputVoltage(t - tag::INPUT_VOLTAGE_0),
                ExtensionValue::Volts(millivolts(v)),
            );
        }
        tag::USER_DATA_0..=tag::USER_DATA_4 => {
            record.extensions.insert(
                Extension::UserData(t - tag::USER_DATA_0),
                ExtensionValue::Signed(read_i32(v, 0)),
            );
        }
        _ => {}
    }
}

// ── Little-endian readers ────────────────────────────────────────────────────
// Callers have already checked the slice holds the full value width.

fn read_u16(v: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([v[at], v[at + 1]])
}

fn read_u32(v: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([v[at], v[at + 1], v[at + 2], v[at + 3]])
}

fn read_i32(v: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([v[at], v[at + 1], v[at + 2], v[at + 3]])
}

fn millivolts(v: &[u8]) -> f64 {
    f64::from(read_u16(v, 0)) / 1000.0
}
