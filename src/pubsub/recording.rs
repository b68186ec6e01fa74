//! Sink double that keeps every published record in memory.

use std::sync::Mutex;

use async_trait::async_trait;

use super::EventSink;
use crate::models::SinkRecord;

#[derive(Default)]
pub(crate) struct RecordingSink {
    records: Mutex<Vec<(String, SinkRecord)>>,
}

impl RecordingSink {
    pub(crate) fn records(&self) -> Vec<(String, SinkRecord)> {
        self.records.lock().unwrap().clone()
    }

    /// Records of one topic, in publish order.
    pub(crate) fn of_topic(&self, suffix: &str) -> Vec<SinkRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, record)| record.topic_suffix() == suffix)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, token_id: &str, record: &SinkRecord) {
        self.records
            .lock()
            .unwrap()
            .push((token_id.to_string(), record.clone()));
    }
}
