//! In-memory registry of live tokens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::models::TokenAggregate;

/// One live token: its aggregate behind a per-token lock plus an evicted flag
/// that followers check before every write.
#[derive(Debug)]
pub struct TrackedToken {
    id: String,
    state: Mutex<TokenAggregate>,
    evicted: AtomicBool,
}

pub type TokenHandle = Arc<TrackedToken>;

impl TrackedToken {
    fn new(aggregate: TokenAggregate) -> Self {
        Self {
            id: aggregate.id.clone(),
            state: Mutex::new(aggregate),
            evicted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Per-token lock. Never hold it across an RPC, cache or sink call.
    pub fn state(&self) -> &Mutex<TokenAggregate> {
        &self.state
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::Release);
    }
}

/// Sharded map from token id to its live handle.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: DashMap<String, TokenHandle>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<TokenHandle> {
        self.tokens.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tokens.contains_key(id)
    }

    /// Insert if absent. Returns the live handle and whether this call inserted it;
    /// when the id is already registered the given aggregate is discarded.
    pub fn put(&self, aggregate: TokenAggregate) -> (TokenHandle, bool) {
        match self.tokens.entry(aggregate.id.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = Arc::new(TrackedToken::new(aggregate));
                entry.insert(handle.clone());
                (handle, true)
            },
        }
    }

    /// Unconditional removal; the removed handle is marked evicted.
    pub fn remove(&self, id: &str) -> Option<TokenHandle> {
        let (_, handle) = self.tokens.remove(id)?;
        handle.mark_evicted();
        Some(handle)
    }

    /// Remove `handle` only if it is still the registered one for its id.
    ///
    /// Returns true for exactly one caller per handle.
    pub fn remove_handle(&self, handle: &TokenHandle) -> bool {
        let removed = self
            .tokens
            .remove_if(handle.id(), |_, current| Arc::ptr_eq(current, handle))
            .is_some();
        if removed {
            handle.mark_evicted();
        }
        removed
    }

    /// Point-in-time copy of every handle. Iterating the copy holds no shard lock.
    pub fn snapshot(&self) -> Vec<TokenHandle> {
        self.tokens.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn for_each<F: FnMut(&TokenHandle)>(&self, mut f: F) {
        for handle in self.snapshot() {
            f(&handle);
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
