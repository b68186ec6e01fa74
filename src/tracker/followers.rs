//! Bounded sampling tasks started when a token is onboarded.
//!
//! Each live token gets a price follower and an ownership follower. Both tick
//! at a fixed interval until their follow time is used up, the token is
//! evicted, or the process shuts down.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use super::registry::TokenHandle;
use crate::config::TrackerSettings;
use crate::models::{MintInfo, PoolAccounts, PriceSample, SinkRecord};
use crate::pubsub::EventSink;
use crate::utils::{now_ms, now_secs};
use crate::worker::TokenFetcher;

/// Shared collaborators handed to every follower.
#[derive(Clone)]
pub struct FollowerContext {
    pub fetcher: TokenFetcher,
    pub sink: Arc<dyn EventSink>,
    pub shutdown: CancellationToken,
}

/// Tick interval and total budget of one follower.
#[derive(Debug, Clone, Copy)]
pub struct FollowSchedule {
    pub interval: Duration,
    pub follow_time: Duration,
}

impl FollowSchedule {
    pub fn price(settings: &TrackerSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.price_interval),
            follow_time: Duration::from_secs(settings.price_follow_time),
        }
    }

    pub fn owners(settings: &TrackerSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.owners_interval),
            follow_time: Duration::from_secs(settings.owners_follow_time),
        }
    }
}

/// Wait for the next tick. False when the follower should stop instead.
async fn next_tick(
    ticker: &mut tokio::time::Interval,
    handle: &TokenHandle,
    shutdown: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = ticker.tick() => !handle.is_evicted(),
    }
}

/// Sample the pool price every `schedule.interval`.
pub async fn follow_price(
    handle: TokenHandle,
    pools: PoolAccounts,
    ctx: FollowerContext,
    schedule: FollowSchedule,
) {
    let mut ticker = interval_at(Instant::now() + schedule.interval, schedule.interval);
    let mut remaining = schedule.follow_time;

    while !remaining.is_zero() {
        if !next_tick(&mut ticker, &handle, &ctx.shutdown).await {
            break;
        }

        let sample = PriceSample {
            price: ctx.fetcher.get_price(&pools).await,
            timestamp: now_secs(),
        };

        {
            let mut token = handle.state().lock().await;
            if handle.is_evicted() {
                break;
            }
            token.push_price(sample.clone());
            token.touch(now_ms());
        }

        ctx.sink.publish(handle.id(), &SinkRecord::Price(sample)).await;
        remaining = remaining.saturating_sub(schedule.interval);
    }

    debug!("Price follower for {} finished", handle.id());
}

/// Sample holder concentration every `schedule.interval`, within an outer
/// deadline of five times the follow time.
pub async fn follow_ownership(
    handle: TokenHandle,
    mint: MintInfo,
    ctx: FollowerContext,
    schedule: FollowSchedule,
) {
    let deadline = schedule.follow_time.saturating_mul(5);
    let id = handle.id().to_string();

    if tokio::time::timeout(deadline, ownership_loop(handle, mint, ctx, schedule))
        .await
        .is_err()
    {
        warn!("Ownership follower for {} hit its deadline", id);
    }
}

async fn ownership_loop(
    handle: TokenHandle,
    mint: MintInfo,
    ctx: FollowerContext,
    schedule: FollowSchedule,
) {
    let mut ticker = interval_at(Instant::now() + schedule.interval, schedule.interval);
    let mut remaining = schedule.follow_time;

    while !remaining.is_zero() {
        if !next_tick(&mut ticker, &handle, &ctx.shutdown).await {
            break;
        }

        let snapshot = ctx
            .fetcher
            .sample_holders(handle.id(), &mint, now_secs())
            .await;

        {
            let mut token = handle.state().lock().await;
            if handle.is_evicted() {
                break;
            }
            token.push_holders(snapshot.clone());
            token.touch(now_ms());
        }

        ctx.sink
            .publish(handle.id(), &SinkRecord::Holders(snapshot))
            .await;
        remaining = remaining.saturating_sub(schedule.interval);
    }

    debug!("Ownership follower for {} finished", handle.id());
}

/// Start both followers for a freshly onboarded token.
pub fn spawn_followers(
    handle: &TokenHandle,
    pools: PoolAccounts,
    mint: MintInfo,
    ctx: &FollowerContext,
    settings: &TrackerSettings,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let price = tokio::spawn(follow_price(
        handle.clone(),
        pools,
        ctx.clone(),
        FollowSchedule::price(settings),
    ));
    let owners = tokio::spawn(follow_ownership(
        handle.clone(),
        mint,
        ctx.clone(),
        FollowSchedule::owners(settings),
    ));
    (price, owners)
}
