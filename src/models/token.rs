use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::series::{
    BurnBucket, BurnLedger, HolderSnapshot, PriceSample, TimeSeries, VolumeBucket, VolumeLedger,
};

/// Off-chain metadata (name/symbol/uri). Best effort: empty when unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// On-chain mint account state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MintInfo {
    /// Raw supply in base units
    pub supply: String,
    /// Supply adjusted by `decimals`
    pub real_supply: BigDecimal,
    pub decimals: u8,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
    /// Program that owns the mint account
    pub owner: String,
    pub is_initialized: bool,
}

/// Liquidity pool token accounts used to derive price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolAccounts {
    pub quote_token: String,
    pub base_pool_account: String,
    pub quote_pool_account: String,
}

/// Full derived state tracked for one token.
///
/// Registry key: `id` (mint address)
/// Cached as JSON; the terminal summary is the same struct with every series cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenAggregate {
    pub id: String,

    // Enrichment (set once at onboarding)
    pub metadata: TokenMetadata,
    pub mint: MintInfo,
    pub pools: Option<PoolAccounts>,
    /// Block time of the pair creation, unix seconds
    pub ipo: i64,

    // Time series
    pub prices: TimeSeries<PriceSample>,
    pub volumes: VolumeLedger,
    pub burns: BurnLedger,
    pub holders: TimeSeries<HolderSnapshot>,

    // Liveness (wall-clock unix ms)
    pub last_updated: i64,
    /// 0 means the token has never been written to the cache
    pub last_cache_update: i64,
}

impl TokenAggregate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn total_burned(&self) -> &BigDecimal {
        self.burns.total_burned()
    }

    pub fn total_volume(&self) -> &BigDecimal {
        self.volumes.total_volume()
    }

    pub fn latest_price(&self) -> Option<&PriceSample> {
        self.prices.last()
    }

    pub fn latest_volume_bucket(&self) -> Option<&VolumeBucket> {
        self.volumes.current()
    }

    pub fn latest_burn_bucket(&self) -> Option<&BurnBucket> {
        self.burns.current()
    }

    pub fn is_cached(&self) -> bool {
        self.last_cache_update != 0
    }

    /// Mark a mutation at wall-clock `now_ms` (independent of event time).
    pub fn touch(&mut self, now_ms: i64) {
        self.last_updated = now_ms;
    }

    pub fn push_price(&mut self, sample: PriceSample) {
        self.prices.push(sample);
    }

    pub fn push_holders(&mut self, snapshot: HolderSnapshot) {
        self.holders.push(snapshot);
    }

    /// Copy of this aggregate with every time series cleared, totals kept.
    pub fn final_summary(&self) -> TokenAggregate {
        let mut summary = self.clone();
        summary.prices.clear();
        summary.holders.clear();
        summary.volumes.clear_series();
        summary.burns.clear_series();
        summary
    }
}
