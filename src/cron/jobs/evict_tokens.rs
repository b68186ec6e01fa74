//! Job to write live tokens back to the cache and evict dead ones.
//!
//! Per token, by wall-clock age:
//! - never cached: cache now
//! - cache copy older than `cache_timeout_seconds` and token still mutating: refresh
//! - cache copy stale and no mutation for `stale_if_dead_for_seconds`: evict,
//!   forwarding the open volume/burn buckets and a terminal summary once

use log::{debug, info, warn};

use crate::models::{SinkRecord, TokenAggregate};
use crate::tracker::{TokenHandle, TokenTracker};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    pub cached: usize,
    pub refreshed: usize,
    pub evicted: usize,
    pub failed: usize,
}

enum Action {
    Cache(TokenAggregate),
    Refresh(TokenAggregate),
    Evict(Vec<SinkRecord>),
}

pub async fn run(tracker: &TokenTracker, now_ms: i64) -> EvictionReport {
    let settings = tracker.settings();
    let timeout_ms = settings.cache_timeout_seconds as i64 * 1000;
    let dead_ms = settings.stale_if_dead_for_seconds as i64 * 1000;
    let mut report = EvictionReport::default();

    for handle in tracker.registry().snapshot() {
        let action = {
            let token = handle.state().lock().await;
            if handle.is_evicted() {
                continue;
            }

            if !token.is_cached() {
                Action::Cache(token.clone())
            } else if now_ms - token.last_cache_update > timeout_ms {
                if now_ms - token.last_updated < dead_ms {
                    Action::Refresh(token.clone())
                } else if tracker.registry().remove_handle(&handle) {
                    Action::Evict(final_records(&token))
                } else {
                    continue;
                }
            } else {
                continue;
            }
        };

        match action {
            Action::Cache(snapshot) => {
                if write_back(tracker, &handle, snapshot, now_ms).await {
                    report.cached += 1;
                } else {
                    report.failed += 1;
                }
            },
            Action::Refresh(snapshot) => {
                if write_back(tracker, &handle, snapshot, now_ms).await {
                    report.refreshed += 1;
                } else {
                    report.failed += 1;
                }
            },
            Action::Evict(records) => {
                for record in &records {
                    tracker.sink().publish(handle.id(), record).await;
                }
                info!("Evicted dead token {}", handle.id());
                report.evicted += 1;
            },
        }
    }

    if report != EvictionReport::default() {
        debug!("Eviction sweep: {:?}", report);
    }
    report
}

/// Open buckets plus the summary, in publish order.
fn final_records(token: &TokenAggregate) -> Vec<SinkRecord> {
    let mut records = Vec::with_capacity(3);
    if let Some(bucket) = token.latest_volume_bucket() {
        records.push(SinkRecord::Volume(bucket.clone()));
    }
    if let Some(bucket) = token.latest_burn_bucket() {
        records.push(SinkRecord::Burn(bucket.clone()));
    }
    records.push(SinkRecord::Final(Box::new(token.final_summary())));
    records
}

async fn write_back(
    tracker: &TokenTracker,
    handle: &TokenHandle,
    mut snapshot: TokenAggregate,
    now_ms: i64,
) -> bool {
    snapshot.last_cache_update = now_ms;
    match tracker.store().save(&snapshot).await {
        Ok(()) => {
            handle.state().lock().await.last_cache_update = now_ms;
            true
        },
        Err(e) => {
            warn!("Cache write for {} failed, retrying next sweep: {:#}", handle.id(), e);
            false
        },
    }
}
