//! Event handling: correlates burns, pair creations and swaps into live token
//! aggregates held in the registry.

pub mod burns;
pub mod followers;
pub mod registry;
pub mod swaps;

use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::cache::TokenStore;
use crate::config::TrackerSettings;
use crate::models::{
    decode_event, BurnEvent, EventKind, NewPairEvent, SinkRecord, SwapEvent, TokenAggregate,
};
use crate::pubsub::EventSink;
use crate::utils::now_ms;
use crate::worker::TokenFetcher;

pub use burns::{BurnCorrelator, UnknownOutcome, UnknownTokenRecord};
pub use followers::{spawn_followers, FollowSchedule, FollowerContext};
pub use registry::{TokenHandle, TokenRegistry, TrackedToken};
pub use swaps::apply_swap;

/// Owns the shared state and collaborators every handler and job works against.
pub struct TokenTracker {
    registry: Arc<TokenRegistry>,
    correlator: Arc<BurnCorrelator>,
    store: TokenStore,
    sink: Arc<dyn EventSink>,
    followers: FollowerContext,
    settings: TrackerSettings,
}

impl TokenTracker {
    pub fn new(
        registry: Arc<TokenRegistry>,
        correlator: Arc<BurnCorrelator>,
        store: TokenStore,
        fetcher: TokenFetcher,
        sink: Arc<dyn EventSink>,
        settings: TrackerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let followers = FollowerContext {
            fetcher,
            sink: sink.clone(),
            shutdown,
        };
        Self {
            registry,
            correlator,
            store,
            sink,
            followers,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    pub fn correlator(&self) -> &Arc<BurnCorrelator> {
        &self.correlator
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Decode a raw transport payload and route it. Undecodable messages are dropped.
    pub async fn dispatch(&self, kind: EventKind, payload: &str) {
        let result = match kind {
            EventKind::Burn => decode_event::<BurnEvent>(payload).map(Routed::Burn),
            EventKind::NewPair => decode_event::<NewPairEvent>(payload).map(Routed::NewPair),
            EventKind::Swap => decode_event::<SwapEvent>(payload).map(Routed::Swap),
        };

        match result {
            Ok(Routed::Burn(event)) => self.handle_burn(event).await,
            Ok(Routed::NewPair(event)) => {
                self.handle_new_pair(event).await;
            },
            Ok(Routed::Swap(event)) => self.handle_swap(event).await,
            Err(e) => warn!("Dropping malformed {} event: {:#}", kind.as_str(), e),
        }
    }

    /// Registered token: fold into its burn series. Blacklisted: refresh only.
    /// Otherwise park it in the unknown table.
    pub async fn handle_burn(&self, event: BurnEvent) {
        let now_ms = now_ms();
        let now = now_ms / 1000;
        let interval = self.settings.bucket_interval();

        if self.correlator.touch_blacklisted(&event.token, now).await {
            debug!("Burn for blacklisted {}", event.token);
            return;
        }

        let applied = self
            .with_live_token(&event.token, now_ms, |token| {
                let closed = token
                    .burns
                    .record(&event.amount, event.block_time_secs(), interval);
                token.touch(now_ms);
                closed
            })
            .await;

        match applied {
            Some(Some(closed)) => {
                self.sink.publish(&event.token, &SinkRecord::Burn(closed)).await;
            },
            Some(None) => {},
            None => match self.correlator.track_unknown(&event, now, interval).await {
                UnknownOutcome::Tracked { hits } => {
                    debug!("Unmatched burn for {} (hit {})", event.token, hits)
                },
                UnknownOutcome::Promoted { .. } | UnknownOutcome::Refreshed => {},
            },
        }
    }

    /// Fold a swap into its token's volume series. Blacklisted ids only get
    /// their timestamp refreshed.
    pub async fn handle_swap(&self, event: SwapEvent) {
        let now_ms = now_ms();
        let interval = self.settings.bucket_interval();

        if self
            .correlator
            .touch_blacklisted(&event.token_address, now_ms / 1000)
            .await
        {
            debug!("Swap for blacklisted {}", event.token_address);
            return;
        }

        let applied = self
            .with_live_token(&event.token_address, now_ms, |token| {
                apply_swap(token, &event, interval, now_ms)
            })
            .await;

        match applied {
            Some(Some(closed)) => {
                self.sink
                    .publish(&event.token_address, &SinkRecord::Volume(closed))
                    .await;
            },
            Some(None) => {},
            None => warn!("Swap {} for untracked token {}", event.signature, event.token_address),
        }
    }

    /// Enrich, register and start following a new token.
    ///
    /// Returns None when enrichment failed; the token is not tracked then.
    pub async fn handle_new_pair(&self, event: NewPairEvent) -> Option<TokenHandle> {
        let id = event.base_token.clone();

        if let Some(handle) = self.registry.get(&id) {
            debug!("Pair for already tracked {}", id);
            return Some(handle);
        }

        let aggregate = match self.followers.fetcher.enrich(&event, now_ms()).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                warn!("Skipping {}: {:#}", id, e);
                return None;
            },
        };

        let pools = aggregate.pools.clone();
        let mint = aggregate.mint.clone();
        let (handle, inserted) = self.registry.put(aggregate);
        if !inserted {
            return Some(handle);
        }

        self.correlator.forget(&id).await;
        if let Some(pools) = pools {
            spawn_followers(&handle, pools, mint, &self.followers, &self.settings);
        }
        info!("Tracking {} ({} live)", id, self.registry.len());
        Some(handle)
    }

    /// Replay parked burns of tokens that have since been registered.
    ///
    /// Returns how many unknown records were merged.
    pub async fn match_unknown_burns(&self) -> usize {
        let interval = self.settings.bucket_interval();
        let now_ms = now_ms();
        let mut merged = 0;

        for record in self.correlator.take_matched().await {
            let applied = match self.registry.get(&record.token_id) {
                Some(handle) => {
                    let mut token = handle.state().lock().await;
                    if handle.is_evicted() {
                        None
                    } else {
                        let closed = token.burns.merge_from(&record.burns, interval);
                        token.touch(now_ms);
                        Some(closed)
                    }
                },
                None => None,
            };

            match applied {
                Some(closed) => {
                    for bucket in closed {
                        self.sink
                            .publish(&record.token_id, &SinkRecord::Burn(bucket))
                            .await;
                    }
                    info!("Merged {} parked burns into {}", record.hits, record.token_id);
                    merged += 1;
                },
                None => self.correlator.restore(record, interval).await,
            }
        }

        merged
    }

    /// Registry handle for `id`, reviving it from the cache when absent.
    /// Blacklisted ids are never revived.
    async fn resolve(&self, id: &str, now_ms: i64) -> Option<TokenHandle> {
        if let Some(handle) = self.registry.get(id) {
            return Some(handle);
        }
        if self.correlator.is_blacklisted(id).await {
            return None;
        }

        match self.store.load(id).await {
            Ok(Some(mut aggregate)) => {
                aggregate.last_cache_update = now_ms;
                aggregate.touch(now_ms);
                let (handle, inserted) = self.registry.put(aggregate);
                if inserted {
                    info!("Revived {} from cache", id);
                }
                Some(handle)
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup for {} failed: {:#}", id, e);
                None
            },
        }
    }

    /// Run `apply` on the live aggregate for `id`. A handle evicted between
    /// lookup and lock is retried once against a fresh resolve.
    async fn with_live_token<R>(
        &self,
        id: &str,
        now_ms: i64,
        mut apply: impl FnMut(&mut TokenAggregate) -> R,
    ) -> Option<R> {
        for _ in 0..2 {
            let handle = self.resolve(id, now_ms).await?;
            let mut token = handle.state().lock().await;
            if handle.is_evicted() {
                continue;
            }
            return Some(apply(&mut token));
        }
        None
    }
}

enum Routed {
    Burn(BurnEvent),
    NewPair(NewPairEvent),
    Swap(SwapEvent),
}
