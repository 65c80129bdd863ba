//! Protocol module: checksum, framing, tag decoding and acknowledgements.

pub mod ack;
pub mod assembler;
pub mod builder;
pub mod checksum;
pub mod frame;
pub mod tags;

pub use ack::build_ack;
pub use assembler::FrameAssembler;
pub use checksum::checksum16;
pub use frame::{validate, validate_with, Frame, FrameError, FramePolicy, Validated};
pub use tags::{decode, decode_frame};
