//! External token cache.
//!
//! Aggregates are written back to Redis as JSON so that a token evicted from
//! memory (or owned by a restarted process) can be revived when a later event
//! references it. The cache has no transactional semantics: a read followed by
//! a write is never assumed to be atomic.

mod redis_cache;

#[cfg(test)]
pub(crate) mod memory;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::TokenAggregate;
use crate::utils::{retry_with_backoff, RetryPolicy};

pub use redis_cache::RedisTokenCache;

/// Key/value contract the tracker needs from the cache backend.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn set(&self, token_id: &str, value: String, ttl: Duration) -> Result<()>;

    async fn get(&self, token_id: &str) -> Result<Option<String>>;
}

/// Typed access to the cache with bounded retries.
///
/// On exhaustion the error is returned and the caller skips this cycle.
#[derive(Clone)]
pub struct TokenStore {
    cache: Arc<dyn TokenCache>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl TokenStore {
    pub fn new(cache: Arc<dyn TokenCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Serialize and write an aggregate under its token id.
    pub async fn save(&self, aggregate: &TokenAggregate) -> Result<()> {
        let payload = serde_json::to_string(aggregate)
            .with_context(|| format!("Failed to serialize token {}", aggregate.id))?;

        retry_with_backoff(self.retry, "cache set", || {
            let payload = payload.clone();
            async move { self.cache.set(&aggregate.id, payload, self.ttl).await }
        })
        .await
    }

    /// Read an aggregate back. `Ok(None)` when the token is not cached.
    pub async fn load(&self, token_id: &str) -> Result<Option<TokenAggregate>> {
        let raw = retry_with_backoff(self.retry, "cache get", || self.cache.get(token_id)).await?;

        match raw {
            Some(json) => {
                let aggregate: TokenAggregate = serde_json::from_str(&json)
                    .with_context(|| format!("Cached state for {} is not a token", token_id))?;
                Ok(Some(aggregate))
            },
            None => Ok(None),
        }
    }
}
