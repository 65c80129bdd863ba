//! # tracklink-core
//!
//! Pure protocol library for GPS trackers that speak the Galileosky-style
//! binary TLV dialect over raw TCP.
//!
//! This crate has no sockets, no async runtime and no global state.  Everything
//! here is a function from bytes to values (or back), which keeps the hard
//! protocol rules testable without a network.
//!
//! # Architecture overview
//!
//! A device sends *frames*.  Each frame is processed in four steps:
//!
//! ```text
//! raw bytes ──► FrameAssembler ──► validate() ──► decode_frame() ──► DecodedRecord
//!                 (reassembly)      (class, length,   (tag walk)
//!                                    CRC16)
//!                                       │
//!                                       └──► build_ack() ──► 3-byte reply
//! ```
//!
//! - **`protocol::checksum`** – CRC-16 (poly `0xA001`, init `0xFFFF`).
//! - **`protocol::frame`** – packet class, length field, archive flag,
//!   completeness and checksum rules.
//! - **`protocol::assembler`** – cuts a TCP byte stream into candidate frames.
//! - **`protocol::tags`** – the tag table and the body decoder.
//! - **`protocol::ack`** – the echo-the-tail acknowledgement.
//! - **`protocol::builder`** – encodes frames; used by tests and benches.
//! - **`record`** – the decoded record and its extension attributes.

pub mod protocol;
pub mod record;

// Re-export the most-used items so callers can write
// `tracklink_core::validate` instead of the full module path.
pub use protocol::ack::{build_ack, ACK_MARKER};
pub use protocol::assembler::{AssemblerError, FrameAssembler};
pub use protocol::builder::FrameBuilder;
pub use protocol::checksum::checksum16;
pub use protocol::frame::{validate, validate_with, Frame, FrameError, FramePolicy, Validated};
pub use protocol::tags::{decode, decode_frame};
pub use record::{DecodedRecord, Extension, ExtensionValue};
