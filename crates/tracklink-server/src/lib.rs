//! tracklink-server library crate.
//!
//! Accepts TCP connections from GPS trackers, decodes their frames with
//! `tracklink-core`, keeps a registry of device sessions and acknowledges
//! every accepted frame.
//!
//! # Architecture
//!
//! ```text
//! GPS trackers (binary frames over TCP)
//!         ↕
//! [tracklink-server]
//!   ├── domain/           ServerConfig, DeviceSession (no I/O)
//!   ├── application/      DeviceRegistry, Ingestor, RecordPublisher seam
//!   └── infrastructure/
//!         ├── server      accept loop, connection cap, shutdown
//!         ├── connection  per-connection read loop and reassembly
//!         ├── status      plaintext liveness and device snapshot port
//!         ├── fanout      broadcast of decoded records
//!         └── config_file TOML loader
//! ```
//!
//! `domain` depends on nothing else in the crate, `application` depends on
//! `domain` and `tracklink-core`, and `infrastructure` wires them to tokio.

/// Domain layer: configuration and session types.
pub mod domain;

/// Application layer: registry and ingest pipeline.
pub mod application;

/// Infrastructure layer: sockets, config file, fan-out.
pub mod infrastructure;
