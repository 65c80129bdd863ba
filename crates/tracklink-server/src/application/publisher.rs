//! Outbound seam for decoded records.

use std::sync::Arc;

use tracklink_core::DecodedRecord;

/// Receives every decoded record after it has been acknowledged.
///
/// Implementations must return promptly and must not fail the caller: a slow
/// or absent subscriber is the publisher's problem, never the connection's.
#[cfg_attr(test, mockall::automock)]
pub trait RecordPublisher: Send + Sync {
    fn publish(&self, record: Arc<DecodedRecord>);
}

/// Publisher that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl RecordPublisher for NullPublisher {
    fn publish(&self, _record: Arc<DecodedRecord>) {}
}
