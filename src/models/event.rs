//! Inbound lifecycle events delivered over the pub/sub transport.
//!
//! Producers publish either a bare object, an envelope
//! `{"event_type": ..., "data": {...}}`, or (for swaps) an envelope with the
//! trade nested under `data.transaction`. All three shapes decode to the
//! same structs.

use std::str::FromStr;

use anyhow::{bail, Context};
use bigdecimal::BigDecimal;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

/// Block times past this (year ~5138) are treated as corrupt.
const MAX_BLOCK_TIME_SECS: f64 = 1e11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Transport channel an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Burn,
    NewPair,
    Swap,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Burn => "burn",
            EventKind::NewPair => "new_pair",
            EventKind::Swap => "swap",
        }
    }
}

/// Common accessor used to reject events without a token id.
pub trait TokenEvent {
    fn token_id(&self) -> &str;
    fn block_time(&self) -> f64;
}

/// Amounts arrive as strings or JSON numbers. Numbers are read back through
/// their shortest decimal form so `0.1` stays `0.1`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireDecimal {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl WireDecimal {
    fn into_decimal<E: serde::de::Error>(self) -> Result<BigDecimal, E> {
        let text = match self {
            WireDecimal::Text(text) => text,
            WireDecimal::Int(n) => return Ok(BigDecimal::from(n)),
            WireDecimal::UInt(n) => return Ok(BigDecimal::from(n)),
            WireDecimal::Float(f) if f.is_finite() => f.to_string(),
            WireDecimal::Float(f) => return Err(E::custom(format!("non-finite amount {}", f))),
        };
        BigDecimal::from_str(text.trim())
            .map_err(|e| E::custom(format!("invalid amount {:?}: {}", text, e)))
    }
}

fn decimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    WireDecimal::deserialize(deserializer)?.into_decimal()
}

fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<WireDecimal>::deserialize(deserializer)?
        .map(WireDecimal::into_decimal)
        .transpose()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BurnEvent {
    pub token: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub authority: String,
    #[serde(deserialize_with = "decimal")]
    pub amount: BigDecimal,
    pub block_time: f64,
}

impl BurnEvent {
    pub fn block_time_secs(&self) -> i64 {
        self.block_time as i64
    }
}

impl TokenEvent for BurnEvent {
    fn token_id(&self) -> &str {
        &self.token
    }

    fn block_time(&self) -> f64 {
        self.block_time
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPairEvent {
    pub base_token: String,
    #[serde(default)]
    pub quote_token: String,
    pub base_pool_account: String,
    pub quote_pool_account: String,
    pub block_time: f64,
}

impl NewPairEvent {
    pub fn block_time_secs(&self) -> i64 {
        self.block_time as i64
    }
}

impl TokenEvent for NewPairEvent {
    fn token_id(&self) -> &str {
        &self.base_token
    }

    fn block_time(&self) -> f64 {
        self.block_time
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapEvent {
    #[serde(default)]
    pub signature: String,
    pub token_address: String,
    pub transaction_type: TradeSide,
    #[serde(default)]
    pub maker: String,
    #[serde(deserialize_with = "decimal")]
    pub amount_sol: BigDecimal,
    #[serde(default, deserialize_with = "optional_decimal")]
    pub fee_sol: Option<BigDecimal>,
    pub block_time: f64,
}

impl SwapEvent {
    pub fn block_time_secs(&self) -> i64 {
        self.block_time as i64
    }
}

impl TokenEvent for SwapEvent {
    fn token_id(&self) -> &str {
        &self.token_address
    }

    fn block_time(&self) -> f64 {
        self.block_time
    }
}

#[derive(Deserialize)]
struct NestedTransaction<T> {
    transaction: T,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire<T> {
    Nested { data: NestedTransaction<T> },
    Enveloped { data: T },
    Bare(T),
}

impl<T> Wire<T> {
    fn into_inner(self) -> T {
        match self {
            Wire::Nested { data } => data.transaction,
            Wire::Enveloped { data } => data,
            Wire::Bare(event) => event,
        }
    }
}

/// Decode one transport payload into an event.
///
/// Malformed JSON, unparseable amounts, unknown trade sides and empty token
/// ids are all decode errors; the caller drops the message.
pub fn decode_event<T>(payload: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned + TokenEvent,
{
    let wire: Wire<T> =
        serde_json::from_str(payload).context("Payload does not match any event shape")?;
    let event = wire.into_inner();
    if event.token_id().trim().is_empty() {
        bail!("Event has an empty token id");
    }
    let block_time = event.block_time();
    if !(0.0..MAX_BLOCK_TIME_SECS).contains(&block_time) {
        bail!("Block time {} out of range", block_time);
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bare_burn() {
        let payload = r#"{"token":"Mint1","account":"Acc","authority":"Auth","amount":"12.5","block_time":1700000000}"#;
        let burn: BurnEvent = decode_event(payload).unwrap();

        assert_eq!(burn.token, "Mint1");
        assert_eq!(burn.amount, BigDecimal::from_str("12.5").unwrap());
        assert_eq!(burn.block_time_secs(), 1_700_000_000);
    }

    #[test]
    fn test_decode_enveloped_pair() {
        let payload = r#"{
            "event_type": "new_pair",
            "data": {
                "base_token": "Base",
                "quote_token": "So11111111111111111111111111111111111111112",
                "base_pool_account": "PoolA",
                "quote_pool_account": "PoolB",
                "block_time": 1700000010.0
            }
        }"#;
        let pair: NewPairEvent = decode_event(payload).unwrap();

        assert_eq!(pair.base_token, "Base");
        assert_eq!(pair.base_pool_account, "PoolA");
        assert_eq!(pair.block_time_secs(), 1_700_000_010);
    }

    #[test]
    fn test_decode_nested_swap() {
        let payload = r#"{
            "event_type": "swap",
            "data": {
                "transaction": {
                    "signature": "sig",
                    "token_address": "Mint2",
                    "transaction_type": "Sell",
                    "maker": "Maker",
                    "amount_sol": "0.75",
                    "fee_sol": "0.0001",
                    "block_time": 1700000020
                }
            }
        }"#;
        let swap: SwapEvent = decode_event(payload).unwrap();

        assert_eq!(swap.token_address, "Mint2");
        assert_eq!(swap.transaction_type, TradeSide::Sell);
        assert_eq!(swap.amount_sol, BigDecimal::from_str("0.75").unwrap());
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(decode_event::<BurnEvent>("not json").is_err());
        assert!(decode_event::<BurnEvent>(r#"{"token":"","amount":"1","block_time":1}"#).is_err());
        assert!(decode_event::<SwapEvent>(
            r#"{"token_address":"M","transaction_type":"Hold","amount_sol":"1","block_time":1}"#
        )
        .is_err());
        assert!(decode_event::<BurnEvent>(r#"{"token":"M","amount":"abc","block_time":1}"#).is_err());
    }

    #[test]
    fn test_numeric_amounts_decode_exactly() {
        let burn: BurnEvent =
            decode_event(r#"{"token":"M","amount":0.1,"block_time":1}"#).unwrap();
        assert_eq!(burn.amount, BigDecimal::from_str("0.1").unwrap());

        let burn: BurnEvent = decode_event(r#"{"token":"M","amount":42,"block_time":1}"#).unwrap();
        assert_eq!(burn.amount, BigDecimal::from(42));

        let swap: SwapEvent = decode_event(
            r#"{"data":{"transaction":{"token_address":"M","transaction_type":"Buy","amount_sol":0.3,"fee_sol":0.0001,"block_time":1}}}"#,
        )
        .unwrap();
        assert_eq!(swap.amount_sol, BigDecimal::from_str("0.3").unwrap());
        assert_eq!(swap.fee_sol, Some(BigDecimal::from_str("0.0001").unwrap()));

        let sum = (0..10).fold(BigDecimal::default(), |acc, _| acc + &burn_amount("0.1"));
        assert_eq!(sum, BigDecimal::from(1));
    }

    fn burn_amount(raw: &str) -> BigDecimal {
        let payload = format!(r#"{{"token":"M","amount":{},"block_time":1}}"#, raw);
        decode_event::<BurnEvent>(&payload).unwrap().amount
    }

    #[test]
    fn test_decode_rejects_out_of_range_block_times() {
        assert!(decode_event::<BurnEvent>(r#"{"token":"M","amount":"1","block_time":1e30}"#).is_err());
        assert!(decode_event::<BurnEvent>(r#"{"token":"M","amount":"1","block_time":-5}"#).is_err());
        assert!(decode_event::<SwapEvent>(
            r#"{"token_address":"M","transaction_type":"Buy","amount_sol":"1","block_time":1e30}"#
        )
        .is_err());
    }
}
