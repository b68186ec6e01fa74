//! Pub/Sub messaging: inbound event subscriptions and the outbound sink.
//!
//! Inbound lifecycle events arrive over Redis pub/sub, one subscription task
//! per channel. Derived records leave through an [`EventSink`], normally the
//! Redpanda (Kafka-compatible) publisher.

mod redpanda;
mod subscriber;

#[cfg(test)]
pub(crate) mod recording;

use async_trait::async_trait;
use log::debug;

use crate::models::SinkRecord;

pub use redpanda::RedpandaPublisher;
pub use subscriber::EventSubscriber;

/// Outbound forwarding sink.
///
/// Best effort: implementations log failures and never report them to the
/// caller, so a sink outage cannot stall event handling.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, token_id: &str, record: &SinkRecord);

    /// Flush pending messages (call on shutdown).
    fn flush(&self) {}
}

/// Sink used when publishing is disabled; records are only logged.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, token_id: &str, record: &SinkRecord) {
        debug!("Sink disabled, dropping {} record for {}", record.topic_suffix(), token_id);
    }
}
