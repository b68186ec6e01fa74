use serde::Serialize;

use super::series::{BurnBucket, HolderSnapshot, PriceSample, VolumeBucket};
use super::token::TokenAggregate;

/// A record forwarded to the outbound sink, keyed by token id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkRecord {
    Price(PriceSample),
    Volume(VolumeBucket),
    Burn(BurnBucket),
    Holders(HolderSnapshot),
    /// Terminal summary emitted on eviction (all series cleared)
    Final(Box<TokenAggregate>),
}

impl SinkRecord {
    /// Topic suffix this record is published under.
    pub fn topic_suffix(&self) -> &'static str {
        match self {
            SinkRecord::Price(_) => "prices",
            SinkRecord::Volume(_) => "volumes",
            SinkRecord::Burn(_) => "burns",
            SinkRecord::Holders(_) => "holders",
            SinkRecord::Final(_) => "tokens",
        }
    }
}

/// Wire payload: the record with the token id injected alongside its fields.
#[derive(Serialize)]
pub struct KeyedRecord<'a> {
    pub token_address: &'a str,
    #[serde(flatten)]
    pub record: &'a SinkRecord,
}
