//! Solana JSON-RPC client.
//!
//! Only the handful of read methods the tracker needs:
//! - `getAccountInfo` (jsonParsed) for mint supply/decimals/authorities
//! - `getAsset` (DAS) for name/symbol/uri
//! - `getTokenAccountBalance` for pool balances
//! - `getTokenLargestAccounts` for holder concentration

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use url::Url;

use crate::config::RpcSettings;
use crate::models::{LargestHolder, MintInfo, TokenMetadata};
use crate::utils::{parse_decimal, ui_amount_from_raw};

/// Read-side chain access used for enrichment and sampling.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_mint(&self, mint: &str) -> Result<MintInfo>;

    async fn get_metadata(&self, mint: &str) -> Result<TokenMetadata>;

    /// Decimal-adjusted balance of an SPL token account.
    async fn get_token_account_balance(&self, account: &str) -> Result<BigDecimal>;

    async fn get_largest_accounts(&self, mint: &str) -> Result<Vec<LargestHolder>>;
}

/// HTTP JSON-RPC client with a concurrency cap shared by every caller.
pub struct SolanaRpcClient {
    http: reqwest::Client,
    url: Url,
    limiter: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(settings: &RpcSettings) -> Result<Self> {
        let url = Url::parse(&settings.url).context("Invalid RPC URL")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http,
            url,
            limiter: Arc::new(Semaphore::new(settings.max_concurrent_requests.max(1))),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .context("RPC limiter closed")?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?;

        if !response.status().is_success() {
            bail!("{} returned HTTP {}", method, response.status());
        }

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .with_context(|| format!("{} returned an unreadable body", method))?;

        envelope.into_result(method)
    }
}

#[async_trait]
impl ChainRpc for SolanaRpcClient {
    async fn get_mint(&self, mint: &str) -> Result<MintInfo> {
        let response: WithContext<Option<AccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([mint, { "encoding": "jsonParsed", "commitment": "finalized" }]),
            )
            .await?;
        parse_mint_account(mint, response.value)
    }

    async fn get_metadata(&self, mint: &str) -> Result<TokenMetadata> {
        let asset: Asset = self.call("getAsset", json!({ "id": mint })).await?;
        Ok(asset.into_metadata())
    }

    async fn get_token_account_balance(&self, account: &str) -> Result<BigDecimal> {
        let response: WithContext<UiTokenAmount> = self
            .call(
                "getTokenAccountBalance",
                json!([account, { "commitment": "processed" }]),
            )
            .await?;
        parse_decimal(&response.value.ui_amount_string)
            .ok_or_else(|| anyhow!("Unparseable balance for {}", account))
    }

    async fn get_largest_accounts(&self, mint: &str) -> Result<Vec<LargestHolder>> {
        let response: WithContext<Vec<LargestAccount>> = self
            .call(
                "getTokenLargestAccounts",
                json!([mint, { "commitment": "processed" }]),
            )
            .await?;
        parse_largest_accounts(response.value)
    }
}

// ============================================
// Wire types
// ============================================

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl<T> RpcEnvelope<T> {
    fn into_result(self, method: &str) -> Result<T> {
        if let Some(err) = self.error {
            bail!("{} failed: {} (code {})", method, err.message, err.code);
        }
        self.result
            .ok_or_else(|| anyhow!("{} returned no result", method))
    }
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
struct AccountInfo {
    owner: String,
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedMint {
    decimals: u8,
    supply: String,
    mint_authority: Option<String>,
    freeze_authority: Option<String>,
    #[serde(default)]
    is_initialized: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiTokenAmount {
    ui_amount_string: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LargestAccount {
    address: String,
    ui_amount_string: String,
}

#[derive(Deserialize, Default)]
struct Asset {
    #[serde(default)]
    content: Option<AssetContent>,
}

#[derive(Deserialize, Default)]
struct AssetContent {
    #[serde(default)]
    json_uri: Option<String>,
    #[serde(default)]
    metadata: Option<AssetMetadata>,
}

#[derive(Deserialize, Default)]
struct AssetMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

impl Asset {
    fn into_metadata(self) -> TokenMetadata {
        let content = self.content.unwrap_or_default();
        let metadata = content.metadata.unwrap_or_default();
        TokenMetadata {
            name: trim_nul(metadata.name.unwrap_or_default()),
            symbol: trim_nul(metadata.symbol.unwrap_or_default()),
            uri: trim_nul(content.json_uri.unwrap_or_default()),
        }
    }
}

/// On-chain metadata strings are NUL-padded to a fixed width.
fn trim_nul(value: String) -> String {
    value.trim_end_matches('\0').to_string()
}

fn parse_mint_account(mint: &str, account: Option<AccountInfo>) -> Result<MintInfo> {
    let account = account.ok_or_else(|| anyhow!("Mint account {} not found", mint))?;

    let info = account
        .data
        .get("parsed")
        .filter(|parsed| parsed.get("type").and_then(Value::as_str) == Some("mint"))
        .and_then(|parsed| parsed.get("info"))
        .cloned()
        .ok_or_else(|| anyhow!("Account {} is not a parsed mint", mint))?;

    let parsed: ParsedMint =
        serde_json::from_value(info).with_context(|| format!("Malformed mint info for {}", mint))?;

    let real_supply = ui_amount_from_raw(&parsed.supply, parsed.decimals)
        .ok_or_else(|| anyhow!("Malformed supply {} for {}", parsed.supply, mint))?;

    Ok(MintInfo {
        supply: parsed.supply,
        real_supply,
        decimals: parsed.decimals,
        mint_authority: parsed.mint_authority,
        freeze_authority: parsed.freeze_authority,
        owner: account.owner,
        is_initialized: parsed.is_initialized,
    })
}

fn parse_largest_accounts(accounts: Vec<LargestAccount>) -> Result<Vec<LargestHolder>> {
    accounts
        .into_iter()
        .map(|account| {
            let amount = parse_decimal(&account.ui_amount_string).ok_or_else(|| {
                anyhow!("Unparseable holder amount for {}", account.address)
            })?;
            Ok(LargestHolder {
                holder: account.address,
                amount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_mint_account() {
        let response: WithContext<Option<AccountInfo>> = serde_json::from_value(json!({
            "context": { "slot": 1 },
            "value": {
                "owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                "lamports": 1461600,
                "data": {
                    "program": "spl-token",
                    "parsed": {
                        "type": "mint",
                        "info": {
                            "decimals": 6,
                            "supply": "1000000000000000",
                            "mintAuthority": null,
                            "freezeAuthority": "Freeze111",
                            "isInitialized": true
                        }
                    },
                    "space": 82
                }
            }
        }))
        .unwrap();

        let mint = parse_mint_account("Mint", response.value).unwrap();

        assert_eq!(mint.decimals, 6);
        assert_eq!(mint.real_supply, BigDecimal::from(1_000_000_000));
        assert_eq!(mint.mint_authority, None);
        assert_eq!(mint.freeze_authority.as_deref(), Some("Freeze111"));
        assert!(mint.is_initialized);
    }

    #[test]
    fn test_parse_mint_account_rejects_missing_and_non_mint() {
        assert!(parse_mint_account("Mint", None).is_err());

        let token_account = AccountInfo {
            owner: "Tokenkeg".to_string(),
            data: json!({ "parsed": { "type": "account", "info": {} } }),
        };
        assert!(parse_mint_account("Mint", Some(token_account)).is_err());
    }

    #[test]
    fn test_parse_largest_accounts() {
        let accounts: Vec<LargestAccount> = serde_json::from_value(json!([
            { "address": "A", "amount": "500", "decimals": 2, "uiAmount": 5.0, "uiAmountString": "5" },
            { "address": "B", "amount": "125", "decimals": 2, "uiAmount": 1.25, "uiAmountString": "1.25" }
        ]))
        .unwrap();

        let holders = parse_largest_accounts(accounts).unwrap();

        assert_eq!(holders.len(), 2);
        assert_eq!(holders[1].holder, "B");
        assert_eq!(holders[1].amount, BigDecimal::from_str("1.25").unwrap());
    }

    #[test]
    fn test_asset_metadata_is_trimmed() {
        let asset: Asset = serde_json::from_value(json!({
            "content": {
                "json_uri": "https://example.com/meta.json\u{0000}",
                "metadata": { "name": "Cinder\u{0000}\u{0000}", "symbol": "CND" }
            }
        }))
        .unwrap();

        let meta = asset.into_metadata();
        assert_eq!(meta.name, "Cinder");
        assert_eq!(meta.symbol, "CND");
        assert_eq!(meta.uri, "https://example.com/meta.json");
    }

    #[test]
    fn test_rpc_error_envelope() {
        let envelope: RpcEnvelope<Value> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Invalid param" }
        }))
        .unwrap();

        let err = envelope.into_result("getAccountInfo").unwrap_err();
        assert!(err.to_string().contains("Invalid param"));
    }
}
