//! Device registry: concurrent identity → session map.
//!
//! The registry is the only state shared between connection tasks.  Every
//! mutation is a single per-key operation on a [`DashMap`] shard, so updates
//! for the same identity are serialised and updates for different identities
//! proceed in parallel.  Callers never get a mutable reference out; reads
//! return clones.
//!
//! Two maps are kept:
//!
//! - `sessions`: identity → [`DeviceSession`], created on first sight and
//!   kept for the life of the process.
//! - `bindings`: connection id → identity, created when a connection first
//!   reveals an identity and removed when it closes.  A per-session count of
//!   live bindings drives the `online` flag.
//!
//! The two maps are never locked at the same time.

use std::net::SocketAddr;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use tracklink_core::DecodedRecord;

use crate::domain::{ConnectionId, DeviceSession, RegistryStats};

/// Concurrent registry of every device seen since startup.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    sessions: DashMap<String, DeviceSession>,
    bindings: DashMap<ConnectionId, String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one frame from `identity`, creating the session on first sight.
    ///
    /// Returns the session's record count after the update.
    pub fn upsert(&self, identity: &str, address: SocketAddr) -> u64 {
        self.update(identity, address, None)
    }

    /// Like [`upsert`](Self::upsert), also copying the record's last-known
    /// position, speed and voltages into the session.
    pub fn observe(&self, identity: &str, address: SocketAddr, record: &DecodedRecord) -> u64 {
        self.update(identity, address, Some(record))
    }

    fn update(&self, identity: &str, address: SocketAddr, record: Option<&DecodedRecord>) -> u64 {
        let now = Utc::now();
        let apply = |session: &mut DeviceSession| {
            session.touch(address, now);
            if let Some(record) = record {
                session.absorb(record);
            }
            session.record_count
        };

        match self.sessions.entry(identity.to_owned()) {
            Entry::Occupied(mut occupied) => apply(occupied.get_mut()),
            Entry::Vacant(vacant) => {
                let mut session = DeviceSession::new(identity, address, now);
                let count = apply(&mut session);
                vacant.insert(session);
                info!(identity, %address, "new device registered");
                count
            }
        }
    }

    /// Binds `conn` to `identity` if the connection has no binding yet.
    ///
    /// Returns `true` when a new binding was created.  A connection keeps the
    /// first identity it revealed.
    pub fn bind(&self, conn: ConnectionId, identity: &str) -> bool {
        match self.bindings.entry(conn) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(vacant) => {
                vacant.insert(identity.to_owned());
            }
        }

        if let Some(mut session) = self.sessions.get_mut(identity) {
            session.live_connections += 1;
            session.online = true;
        }
        debug!(%conn, identity, "connection bound");
        true
    }

    /// Removes the binding of `conn`, returning the identity it was bound to.
    ///
    /// The session itself stays; it goes offline once no other connection is
    /// bound to it.
    pub fn unbind(&self, conn: ConnectionId) -> Option<String> {
        let (_, identity) = self.bindings.remove(&conn)?;

        if let Some(mut session) = self.sessions.get_mut(&identity) {
            session.live_connections = session.live_connections.saturating_sub(1);
            session.online = session.live_connections > 0;
        }
        debug!(%conn, identity = %identity, "connection unbound");
        Some(identity)
    }

    /// Identity bound to `conn`, if any.
    pub fn binding(&self, conn: ConnectionId) -> Option<String> {
        self.bindings.get(&conn).map(|r| r.value().clone())
    }

    /// Clone of the session for `identity`.
    pub fn get(&self, identity: &str) -> Option<DeviceSession> {
        self.sessions.get(identity).map(|r| r.value().clone())
    }

    /// All sessions, sorted by identity.
    ///
    /// Each session is read atomically; the set as a whole is not a
    /// point-in-time snapshot across keys.
    pub fn snapshot(&self) -> Vec<DeviceSession> {
        let mut all: Vec<DeviceSession> = self.sessions.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.identity.cmp(&b.identity));
        all
    }

    pub fn stats(&self) -> RegistryStats {
        self.sessions
            .iter()
            .fold(RegistryStats::default(), |mut stats, r| {
                stats.devices += 1;
                stats.online += usize::from(r.online);
                stats.total_records += r.record_count;
                stats
            })
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
