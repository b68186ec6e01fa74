//! Redpanda (Kafka-compatible) sink implementation.
//!
//! Publishes samples, closed buckets and terminal summaries for external
//! consumers. Uses fire-and-forget semantics so a slow broker never blocks
//! event handling: at-least-once from our side, no retry on failure.

use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use super::EventSink;
use crate::config::RedpandaSettings;
use crate::models::{KeyedRecord, SinkRecord};

/// Redpanda publisher for token aggregates.
///
/// Every record kind goes to its own topic, keyed by token id so all records
/// of one token land on the same partition.
pub struct RedpandaPublisher {
    producer: FutureProducer,
    topic_prefix: String,
}

impl RedpandaPublisher {
    /// Create a new Redpanda publisher.
    ///
    /// Returns None if Redpanda is disabled in settings or producer creation fails.
    pub fn new(settings: &RedpandaSettings) -> Option<Self> {
        if !settings.enabled {
            info!("Redpanda publishing is disabled");
            return None;
        }

        info!("Connecting to Redpanda brokers: {}", settings.brokers);

        let producer: FutureProducer = match ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "100000")
            .set("linger.ms", "5") // Small delay to batch messages
            .create()
        {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to create Redpanda producer: {}", e);
                return None;
            },
        };

        info!(
            "Redpanda publisher initialized with topic prefix: {}",
            settings.topic_prefix
        );

        Some(Self {
            producer,
            topic_prefix: settings.topic_prefix.clone(),
        })
    }

    fn topic_for(&self, record: &SinkRecord) -> String {
        format!("{}.{}", self.topic_prefix, record.topic_suffix())
    }
}

#[async_trait]
impl EventSink for RedpandaPublisher {
    async fn publish(&self, token_id: &str, record: &SinkRecord) {
        let topic = self.topic_for(record);
        let payload = match serde_json::to_string(&KeyedRecord {
            token_address: token_id,
            record,
        }) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize message for {}: {}", topic, e);
                return;
            },
        };

        let message = FutureRecord::to(&topic).key(token_id).payload(&payload);

        // Fire-and-forget with short timeout
        if let Err((e, _)) = self.producer.send(message, Duration::from_millis(100)).await {
            warn!("Failed to send message to {}: {}", topic, e);
        }
    }

    fn flush(&self) {
        self.producer.flush(Duration::from_secs(5)).ok();
    }
}

impl Drop for RedpandaPublisher {
    fn drop(&mut self) {
        EventSink::flush(self);
    }
}
