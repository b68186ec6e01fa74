use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::TokenCache;

/// Redis-backed token cache (`SET key value EX ttl` / `GET key`).
///
/// The multiplexed connection is cheap to clone and safe to share across
/// tasks; each call clones it rather than locking.
#[derive(Clone)]
pub struct RedisTokenCache {
    conn: MultiplexedConnection,
}

impl RedisTokenCache {
    pub async fn new(client: &redis::Client) -> Result<Self> {
        info!("Connecting to Redis token cache");

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to open Redis connection for the token cache")?;

        info!("Successfully connected to Redis token cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn set(&self, token_id: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(token_id, value, seconds)
            .await
            .with_context(|| format!("SET {} failed", token_id))
    }

    async fn get(&self, token_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(token_id)
            .await
            .with_context(|| format!("GET {} failed", token_id))
    }
}
