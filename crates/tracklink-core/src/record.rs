//! Decoded telemetry record and its extension attributes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Tag values that have no dedicated field on [`DecodedRecord`].
///
/// The set is closed: every variant corresponds to one tag (or tag family) of
/// the decoder.  The `Display` form is the camelCase attribute name, e.g.
/// `deviceNumber` or `inputVoltage1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Extension {
    DeviceNumber,
    Milliseconds,
    Hdop,
    Inputs,
    /// Analog input voltage, indexed from zero.
    InputVoltage(u8),
    /// User data slot, indexed from zero.
    UserData(u8),
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extension::DeviceNumber => f.write_str("deviceNumber"),
            Extension::Milliseconds => f.write_str("milliseconds"),
            Extension::Hdop => f.write_str("hdop"),
            Extension::Inputs => f.write_str("inputs"),
            Extension::InputVoltage(n) => write!(f, "inputVoltage{n}"),
            Extension::UserData(n) => write!(f, "userData{n}"),
        }
    }
}

impl Serialize for Extension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Numeric value of an [`Extension`] attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    Unsigned(u32),
    Signed(i32),
    /// Already scaled from millivolts.
    Volts(f64),
}

impl ExtensionValue {
    /// The value as an unsigned integer, if it is one.
    pub fn as_unsigned(&self) -> Option<u32> {
        match self {
            ExtensionValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a float, whatever its variant.
    pub fn as_f64(&self) -> f64 {
        match self {
            ExtensionValue::Unsigned(v) => f64::from(*v),
            ExtensionValue::Signed(v) => f64::from(*v),
            ExtensionValue::Volts(v) => *v,
        }
    }
}

/// One decoded data frame.
///
/// Every field is optional because a frame carries only the tags the device
/// chose to send.  Records are built once by the decoder and then shared
/// read-only (usually behind an `Arc`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedRecord {
    /// Device identity (IMEI), trimmed of padding.
    pub identity: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Degrees, six decimal digits.
    pub latitude: Option<f64>,
    /// Degrees, six decimal digits.
    pub longitude: Option<f64>,
    /// km/h, one decimal digit.
    pub speed_kmh: Option<f64>,
    /// Degrees, one decimal digit.
    pub heading_deg: Option<f64>,
    /// Meters.
    pub altitude_m: Option<u16>,
    /// Not carried by any tag of this dialect; left for enrichment upstream.
    pub satellites: Option<u8>,
    pub status: Option<u16>,
    /// Volts.
    pub supply_voltage: Option<f64>,
    /// Volts.
    pub battery_voltage: Option<f64>,
    /// Number of archived records reported by the device.
    pub archive_count: Option<u16>,
    /// Bit 15 of the frame length field.
    pub has_unsent_archive: bool,
    pub extensions: BTreeMap<Extension, ExtensionValue>,
}

impl DecodedRecord {
    /// Looks up an extension attribute.
    pub fn extension(&self, key: Extension) -> Option<ExtensionValue> {
        self.extensions.get(&key).copied()
    }

    pub fn hdop(&self) -> Option<u8> {
        self.extension(Extension::Hdop)
            .and_then(|v| v.as_unsigned())
            .and_then(|v| u8::try_from(v).ok())
    }

    /// Digital input bitmask.
    pub fn inputs(&self) -> Option<u16> {
        self.extension(Extension::Inputs)
            .and_then(|v| v.as_unsigned())
            .and_then(|v| u16::try_from(v).ok())
    }

    /// Voltage of analog input `n`, in volts.
    pub fn input_voltage(&self, n: u8) -> Option<f64> {
        self.extension(Extension::InputVoltage(n)).map(|v| v.as_f64())
    }

    /// `true` once the frame revealed a position.
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}
