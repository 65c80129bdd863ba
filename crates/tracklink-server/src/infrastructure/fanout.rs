//! Best-effort record fan-out over a `tokio::sync::broadcast` channel.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use tracklink_core::DecodedRecord;

use crate::application::RecordPublisher;

/// Publishes records to every current subscriber.
///
/// Publishing never blocks.  With no subscribers the record is dropped; a
/// subscriber that falls more than `capacity` records behind loses the oldest
/// ones and sees `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Arc<DecodedRecord>>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DecodedRecord>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl RecordPublisher for BroadcastPublisher {
    fn publish(&self, record: Arc<DecodedRecord>) {
        if let Err(broadcast::error::SendError(record)) = self.tx.send(record) {
            trace!(identity = ?record.identity, "no subscribers; record dropped");
        }
    }
}
