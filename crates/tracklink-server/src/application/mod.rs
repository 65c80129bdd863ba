//! Application layer for tracklink-server.
//!
//! - [`registry`]: concurrent device registry shared by all connections.
//! - [`ingest`]: validate, decode, update registry, build the reply.
//! - [`publisher`]: the seam decoded records leave through.

pub mod ingest;
pub mod publisher;
pub mod registry;

pub use ingest::{IngestOutcome, Ingestor};
pub use publisher::{NullPublisher, RecordPublisher};
pub use registry::DeviceRegistry;
