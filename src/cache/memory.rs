//! In-memory cache double for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::TokenCache;

#[derive(Default)]
pub(crate) struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Duration)>>,
    failing_writes: AtomicU32,
    write_attempts: AtomicU32,
}

impl MemoryCache {
    pub(crate) fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub(crate) fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone())
    }

    pub(crate) fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    pub(crate) fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Duration::from_secs(60)));
    }
}

#[async_trait]
impl TokenCache for MemoryCache {
    async fn set(&self, token_id: &str, value: String, ttl: Duration) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            bail!("cache unavailable");
        }
        self.entries
            .lock()
            .unwrap()
            .insert(token_id.to_string(), (value, ttl));
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<String>> {
        Ok(self.raw(token_id))
    }
}
