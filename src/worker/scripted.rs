//! In-memory [`ChainRpc`] for tests. Anything not scripted is an RPC error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;

use super::ChainRpc;
use crate::models::{LargestHolder, MintInfo, TokenMetadata};

#[derive(Default)]
pub(crate) struct ScriptedRpc {
    mints: Mutex<HashMap<String, MintInfo>>,
    metadata: Mutex<HashMap<String, TokenMetadata>>,
    balances: Mutex<HashMap<String, BigDecimal>>,
    holders: Mutex<HashMap<String, Vec<LargestHolder>>>,
    mint_calls: AtomicUsize,
    stalled_holders: AtomicBool,
}

impl ScriptedRpc {
    pub(crate) fn set_mint(&self, mint: &str, real_supply: i64) {
        let info = MintInfo {
            supply: (real_supply * 1_000_000).to_string(),
            real_supply: BigDecimal::from(real_supply),
            decimals: 6,
            owner: "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".to_string(),
            is_initialized: true,
            ..MintInfo::default()
        };
        self.mints.lock().unwrap().insert(mint.to_string(), info);
    }

    pub(crate) fn set_metadata(&self, mint: &str, name: &str, symbol: &str) {
        self.metadata.lock().unwrap().insert(
            mint.to_string(),
            TokenMetadata {
                name: name.to_string(),
                symbol: symbol.to_string(),
                uri: String::new(),
            },
        );
    }

    pub(crate) fn set_balance(&self, account: &str, amount: i64) {
        self.balances
            .lock()
            .unwrap()
            .insert(account.to_string(), BigDecimal::from(amount));
    }

    pub(crate) fn set_holders(&self, mint: &str, amounts: &[(&str, i64)]) {
        let holders = amounts
            .iter()
            .map(|(holder, amount)| LargestHolder {
                holder: holder.to_string(),
                amount: BigDecimal::from(*amount),
            })
            .collect();
        self.holders.lock().unwrap().insert(mint.to_string(), holders);
    }

    /// Make every holder lookup hang forever.
    pub(crate) fn stall_holders(&self) {
        self.stalled_holders.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mint_calls(&self) -> usize {
        self.mint_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainRpc for ScriptedRpc {
    async fn get_mint(&self, mint: &str) -> Result<MintInfo> {
        self.mint_calls.fetch_add(1, Ordering::SeqCst);
        self.mints
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .ok_or_else(|| anyhow!("no mint {}", mint))
    }

    async fn get_metadata(&self, mint: &str) -> Result<TokenMetadata> {
        self.metadata
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .ok_or_else(|| anyhow!("no asset {}", mint))
    }

    async fn get_token_account_balance(&self, account: &str) -> Result<BigDecimal> {
        self.balances
            .lock()
            .unwrap()
            .get(account)
            .cloned()
            .ok_or_else(|| anyhow!("no account {}", account))
    }

    async fn get_largest_accounts(&self, mint: &str) -> Result<Vec<LargestHolder>> {
        if self.stalled_holders.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.holders
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .ok_or_else(|| anyhow!("no holders for {}", mint))
    }
}
