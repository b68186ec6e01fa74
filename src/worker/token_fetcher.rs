use crate::models::{
    HolderSnapshot, MintInfo, NewPairEvent, PoolAccounts, PriceSample, TokenAggregate,
    TokenMetadata,
};
use crate::utils::{percentage, ratio_or_zero, retry_with_backoff, RetryPolicy};
use crate::worker::ChainRpc;
use anyhow::{bail, Context, Result};
use bigdecimal::{BigDecimal, Zero};
use log::{debug, info, warn};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Token enrichment and sampling over the chain RPC
#[derive(Clone)]
pub struct TokenFetcher {
    rpc: Arc<dyn ChainRpc>,
    retry: RetryPolicy,
    /// Cache of mints that failed enrichment (closed accounts, non-mints, etc.)
    /// Prevents repeated pair events from hammering the RPC for the same token
    invalid_tokens: Cache<String, ()>,
}

impl TokenFetcher {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        // 10,000 capacity, 1 hour TTL so a mint is retried eventually
        let invalid_tokens = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self {
            rpc,
            retry: RetryPolicy::default(),
            invalid_tokens,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a fresh aggregate for a newly created pair.
    ///
    /// Mint info and the initial holder snapshot are required; metadata is
    /// best effort. On failure the mint is remembered as invalid.
    pub async fn enrich(&self, pair: &NewPairEvent, now_ms: i64) -> Result<TokenAggregate> {
        let id = &pair.base_token;

        if self.invalid_tokens.contains_key(id) {
            bail!("Token {} failed enrichment recently", id);
        }

        match self.fetch_aggregate(pair, now_ms).await {
            Ok(aggregate) => {
                info!(
                    "Enriched {} ({}) supply={} decimals={}",
                    id, aggregate.metadata.symbol, aggregate.mint.real_supply, aggregate.mint.decimals
                );
                Ok(aggregate)
            },
            Err(e) => {
                self.invalid_tokens.insert(id.clone(), ()).await;
                Err(e)
            },
        }
    }

    async fn fetch_aggregate(&self, pair: &NewPairEvent, now_ms: i64) -> Result<TokenAggregate> {
        let id = pair.base_token.as_str();

        let mint = retry_with_backoff(self.retry, "getAccountInfo", || self.rpc.get_mint(id))
            .await
            .with_context(|| format!("Mint lookup failed for {}", id))?;

        let pools = PoolAccounts {
            quote_token: pair.quote_token.clone(),
            base_pool_account: pair.base_pool_account.clone(),
            quote_pool_account: pair.quote_pool_account.clone(),
        };

        let timestamp = now_ms / 1000;
        let (metadata, holders, price) = tokio::join!(
            self.fetch_metadata(id),
            self.fetch_holders(id, &mint, timestamp),
            self.get_price(&pools),
        );
        let holders = holders.with_context(|| format!("Holder lookup failed for {}", id))?;

        let mut aggregate = TokenAggregate::new(id);
        aggregate.metadata = metadata;
        aggregate.mint = mint;
        aggregate.pools = Some(pools);
        aggregate.ipo = pair.block_time_secs();
        aggregate.push_price(PriceSample { price, timestamp });
        aggregate.push_holders(holders);
        aggregate.touch(now_ms);

        Ok(aggregate)
    }

    /// Name/symbol/uri. Optional: defaults to empty strings.
    async fn fetch_metadata(&self, mint: &str) -> TokenMetadata {
        match self.rpc.get_metadata(mint).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("No metadata for {}: {:#}", mint, e);
                TokenMetadata::default()
            },
        }
    }

    /// Largest holders and their combined share of the supply.
    pub async fn fetch_holders(
        &self,
        mint_id: &str,
        mint: &MintInfo,
        timestamp: i64,
    ) -> Result<HolderSnapshot> {
        let holders = retry_with_backoff(self.retry, "getTokenLargestAccounts", || {
            self.rpc.get_largest_accounts(mint_id)
        })
        .await?;

        let held = holders
            .iter()
            .fold(BigDecimal::zero(), |acc, holder| acc + &holder.amount);

        Ok(HolderSnapshot {
            top_ownership_percentage: percentage(&held, &mint.real_supply),
            holders,
            timestamp,
        })
    }

    /// Holder snapshot for a follower tick; an empty snapshot when the RPC is down.
    pub async fn sample_holders(&self, mint_id: &str, mint: &MintInfo, timestamp: i64) -> HolderSnapshot {
        match self.fetch_holders(mint_id, mint, timestamp).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Holder sample failed for {}: {:#}", mint_id, e);
                HolderSnapshot::empty(timestamp)
            },
        }
    }

    /// Quote balance / base balance, zero if either side is empty or unreadable.
    pub async fn get_price(&self, pools: &PoolAccounts) -> BigDecimal {
        let (base, quote) = tokio::join!(
            self.fetch_pool_balance(&pools.base_pool_account),
            self.fetch_pool_balance(&pools.quote_pool_account),
        );

        if base.is_zero() || quote.is_zero() {
            return BigDecimal::zero();
        }
        ratio_or_zero(&quote, &base)
    }

    async fn fetch_pool_balance(&self, account: &str) -> BigDecimal {
        let balance = retry_with_backoff(self.retry, "getTokenAccountBalance", || {
            self.rpc.get_token_account_balance(account)
        })
        .await;

        match balance {
            Ok(amount) => amount,
            Err(e) => {
                warn!("Pool balance unavailable for {}: {:#}", account, e);
                BigDecimal::zero()
            },
        }
    }
}
