pub mod event;
pub mod series;
pub mod sink;
pub mod token;

pub use event::{decode_event, BurnEvent, EventKind, NewPairEvent, SwapEvent, TokenEvent, TradeSide};
pub use series::{
    BucketEdge, BurnBucket, BurnLedger, HolderSnapshot, LargestHolder, PriceSample, TimeSeries,
    VolumeBucket, VolumeLedger,
};
pub use sink::{KeyedRecord, SinkRecord};
pub use token::{MintInfo, PoolAccounts, TokenAggregate, TokenMetadata};
