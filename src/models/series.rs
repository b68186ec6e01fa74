//! Time-bucketed series and the ledgers built on top of them.
//!
//! A [`TimeSeries`] is append-only. Burn and volume history are kept in
//! ledgers that own both the bucket series and its running totals, so a
//! bucket update and the matching total increment always happen in the same
//! `&mut` call.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::event::TradeSide;

/// Append-only ordered sequence of samples or buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries<T> {
    items: Vec<T>,
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> TimeSeries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// The current bucket / most recent sample.
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    pub(crate) fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

/// Which side of `start + interval` still belongs to the open bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketEdge {
    /// A new bucket opens only when `event_time > start + interval` (burns).
    Exclusive,
    /// A new bucket opens once `start + interval <= event_time` (volume).
    Inclusive,
}

impl BucketEdge {
    /// Whether an event at `event_time` must open a new bucket.
    pub fn opens_new(self, current_start: Option<i64>, event_time: i64, interval: i64) -> bool {
        let Some(start) = current_start else {
            return true;
        };
        let boundary = start.saturating_add(interval);
        match self {
            BucketEdge::Exclusive => event_time > boundary,
            BucketEdge::Inclusive => event_time >= boundary,
        }
    }
}

// ============================================
// Samples
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: BigDecimal,
    /// Wall-clock unix seconds at which the pools were read
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargestHolder {
    pub holder: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    pub holders: Vec<LargestHolder>,
    /// Share of supply held by `holders`, in percent
    pub top_ownership_percentage: BigDecimal,
    pub timestamp: i64,
}

impl HolderSnapshot {
    /// Neutral snapshot used when the holder fetch could not be completed.
    pub fn empty(timestamp: i64) -> Self {
        Self {
            holders: Vec::new(),
            top_ownership_percentage: BigDecimal::default(),
            timestamp,
        }
    }
}

// ============================================
// Burns
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnBucket {
    pub start_time: i64,
    pub amount_burned: BigDecimal,
}

/// Burn buckets plus `total_burned`, which always equals the bucket sum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurnLedger {
    buckets: TimeSeries<BurnBucket>,
    total_burned: BigDecimal,
}

impl BurnLedger {
    pub fn buckets(&self) -> &TimeSeries<BurnBucket> {
        &self.buckets
    }

    pub fn total_burned(&self) -> &BigDecimal {
        &self.total_burned
    }

    pub fn current(&self) -> Option<&BurnBucket> {
        self.buckets.last()
    }

    /// Fold a burn into the series.
    ///
    /// Returns the bucket that was closed when this burn opened a new one.
    pub fn record(
        &mut self,
        amount: &BigDecimal,
        event_time: i64,
        interval: i64,
    ) -> Option<BurnBucket> {
        let current_start = self.buckets.last().map(|b| b.start_time);
        let closed = if BucketEdge::Exclusive.opens_new(current_start, event_time, interval) {
            let closed = self.buckets.last().cloned();
            self.buckets.push(BurnBucket {
                start_time: event_time,
                amount_burned: amount.clone(),
            });
            closed
        } else {
            if let Some(bucket) = self.buckets.last_mut() {
                bucket.amount_burned += amount;
            }
            None
        };
        self.total_burned += amount;
        closed
    }

    /// Replay another ledger's buckets into this one, bucket by bucket, with
    /// the same open/merge rule as live burns.
    ///
    /// Returns every bucket closed along the way.
    pub fn merge_from(&mut self, provisional: &BurnLedger, interval: i64) -> Vec<BurnBucket> {
        provisional
            .buckets
            .iter()
            .filter_map(|b| self.record(&b.amount_burned, b.start_time, interval))
            .collect()
    }

    pub(crate) fn clear_series(&mut self) {
        self.buckets.clear();
    }
}

// ============================================
// Volume
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBucket {
    pub start_time: i64,
    pub buy_volume: BigDecimal,
    pub sell_volume: BigDecimal,
    pub volume: BigDecimal,
    pub number_of_buys: u64,
    pub number_of_sells: u64,
}

impl VolumeBucket {
    fn opened(start_time: i64) -> Self {
        Self {
            start_time,
            buy_volume: BigDecimal::default(),
            sell_volume: BigDecimal::default(),
            volume: BigDecimal::default(),
            number_of_buys: 0,
            number_of_sells: 0,
        }
    }

    fn add(&mut self, side: TradeSide, amount: &BigDecimal) {
        match side {
            TradeSide::Buy => {
                self.buy_volume += amount;
                self.number_of_buys += 1;
            },
            TradeSide::Sell => {
                self.sell_volume += amount;
                self.number_of_sells += 1;
            },
        }
        self.volume += amount;
    }
}

/// Volume buckets plus the lifetime totals derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeLedger {
    buckets: TimeSeries<VolumeBucket>,
    total_volume: BigDecimal,
    total_buy_volume: BigDecimal,
    total_sell_volume: BigDecimal,
    number_of_buys: u64,
    number_of_sells: u64,
}

impl VolumeLedger {
    pub fn buckets(&self) -> &TimeSeries<VolumeBucket> {
        &self.buckets
    }

    pub fn current(&self) -> Option<&VolumeBucket> {
        self.buckets.last()
    }

    pub fn total_volume(&self) -> &BigDecimal {
        &self.total_volume
    }

    pub fn total_buy_volume(&self) -> &BigDecimal {
        &self.total_buy_volume
    }

    pub fn total_sell_volume(&self) -> &BigDecimal {
        &self.total_sell_volume
    }

    pub fn number_of_buys(&self) -> u64 {
        self.number_of_buys
    }

    pub fn number_of_sells(&self) -> u64 {
        self.number_of_sells
    }

    /// Fold a trade into the series, returning the bucket it closed (if any).
    pub fn record(
        &mut self,
        side: TradeSide,
        amount: &BigDecimal,
        event_time: i64,
        interval: i64,
    ) -> Option<VolumeBucket> {
        let current_start = self.buckets.last().map(|b| b.start_time);
        let mut closed = None;
        if BucketEdge::Inclusive.opens_new(current_start, event_time, interval) {
            closed = self.buckets.last().cloned();
            self.buckets.push(VolumeBucket::opened(event_time));
        }
        if let Some(bucket) = self.buckets.last_mut() {
            bucket.add(side, amount);
        }

        match side {
            TradeSide::Buy => {
                self.total_buy_volume += amount;
                self.number_of_buys += 1;
            },
            TradeSide::Sell => {
                self.total_sell_volume += amount;
                self.number_of_sells += 1;
            },
        }
        self.total_volume += amount;
        closed
    }

    pub(crate) fn clear_series(&mut self) {
        self.buckets.clear();
    }
}
