//! Device session types.
//!
//! A [`DeviceSession`] is the long-lived view of one tracker: when it was last
//! heard from, how many records it sent, and the last values it reported.
//! Sessions are owned by the registry; everything outside it works on clones.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use tracklink_core::DecodedRecord;

/// Identifies one accepted TCP connection for its whole lifetime.
pub type ConnectionId = Uuid;

/// Per-connection facts passed down the ingest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub peer: SocketAddr,
}

impl ConnectionContext {
    /// Creates a context with a fresh random id.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
        }
    }
}

/// Registry state for one device identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    pub identity: String,
    pub first_seen: DateTime<Utc>,
    /// Never moves backwards, even if the wall clock does.
    pub last_seen: DateTime<Utc>,
    /// Decoded records attributed to this identity.
    pub record_count: u64,
    /// `true` while at least one open connection is bound to this identity.
    pub online: bool,
    pub last_address: SocketAddr,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub supply_voltage: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub satellites: Option<u8>,
    /// Open connections currently bound to this identity.
    #[serde(skip)]
    pub(crate) live_connections: usize,
}

impl DeviceSession {
    /// A session seen for the first time at `now`, with no records yet.
    ///
    /// It starts offline; only a connection binding brings it online.
    pub fn new(identity: impl Into<String>, address: SocketAddr, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            first_seen: now,
            last_seen: now,
            record_count: 0,
            online: false,
            last_address: address,
            latitude: None,
            longitude: None,
            speed_kmh: None,
            supply_voltage: None,
            battery_voltage: None,
            satellites: None,
            live_connections: 0,
        }
    }

    /// Counts one more record seen from `address` at `now`.
    pub fn touch(&mut self, address: SocketAddr, now: DateTime<Utc>) {
        self.record_count += 1;
        self.last_seen = self.last_seen.max(now);
        self.last_address = address;
    }

    /// Copies the last-known values carried by `record`.
    ///
    /// Fields the record does not carry keep their previous value.
    pub fn absorb(&mut self, record: &DecodedRecord) {
        if record.has_position() {
            self.latitude = record.latitude;
            self.longitude = record.longitude;
        }
        if record.speed_kmh.is_some() {
            self.speed_kmh = record.speed_kmh;
        }
        if record.supply_voltage.is_some() {
            self.supply_voltage = record.supply_voltage;
        }
        if record.battery_voltage.is_some() {
            self.battery_voltage = record.battery_voltage;
        }
        if record.satellites.is_some() {
            self.satellites = record.satellites;
        }
    }
}

/// Aggregate registry figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub devices: usize,
    pub online: usize,
    pub total_records: u64,
}
