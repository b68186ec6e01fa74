//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Matching parked burns against newly registered tokens
//! - Backing up, reloading and expiring the burn blacklist
//! - Writing tokens back to the cache and evicting dead ones

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::{BlacklistSettings, TrackerSettings};
use crate::tracker::TokenTracker;
use crate::utils::{now_ms, now_secs};

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    tracker: Arc<TokenTracker>,
    tracker_settings: TrackerSettings,
    blacklist_settings: BlacklistSettings,
}

/// Lock held for the duration of one run so a slow run is skipped, not stacked.
type RunGuard = Arc<Mutex<()>>;

impl CronScheduler {
    pub fn new(
        tracker: Arc<TokenTracker>,
        tracker_settings: TrackerSettings,
        blacklist_settings: BlacklistSettings,
    ) -> Self {
        Self {
            tracker,
            tracker_settings,
            blacklist_settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        // Register all jobs
        self.register_match_unknown_burns_job(&scheduler).await?;
        self.register_backup_blacklist_job(&scheduler).await?;
        self.register_reload_blacklist_job(&scheduler).await?;
        self.register_cleanup_blacklist_job(&scheduler).await?;
        self.register_evict_tokens_job(&scheduler).await?;

        // Start the scheduler
        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 5);

        // Wait for cancellation
        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_match_unknown_burns_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let tracker = self.tracker.clone();
        let guard = RunGuard::default();
        let interval = self.tracker_settings.price_interval;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let tracker = tracker.clone();
            let guard = guard.clone();
            Box::pin(async move {
                let Ok(_running) = guard.try_lock() else {
                    debug!("match_unknown_burns still running, skipping");
                    return;
                };
                jobs::match_unknown_burns::run(&tracker).await;
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered match_unknown_burns job (every {}s)", interval);
        Ok(())
    }

    async fn register_backup_blacklist_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let tracker = self.tracker.clone();
        let interval = self.blacklist_settings.backup_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let tracker = tracker.clone();
            Box::pin(async move {
                if let Err(e) = jobs::blacklist::backup(tracker.correlator()).await {
                    error!("Failed to back up blacklist: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered backup_blacklist job (every {}s)", interval);
        Ok(())
    }

    async fn register_reload_blacklist_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let tracker = self.tracker.clone();
        let interval = self.blacklist_settings.reload_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let tracker = tracker.clone();
            Box::pin(async move {
                if let Err(e) = jobs::blacklist::reload(tracker.correlator(), now_secs()).await {
                    error!("Failed to reload blacklist: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered reload_blacklist job (every {}s)", interval);
        Ok(())
    }

    async fn register_cleanup_blacklist_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let tracker = self.tracker.clone();
        let interval = self.blacklist_settings.cleanup_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let tracker = tracker.clone();
            Box::pin(async move {
                jobs::blacklist::cleanup(tracker.correlator(), now_secs()).await;
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered cleanup_blacklist job (every {}s)", interval);
        Ok(())
    }

    async fn register_evict_tokens_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let tracker = self.tracker.clone();
        let guard = RunGuard::default();
        let interval = self.tracker_settings.eviction_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let tracker = tracker.clone();
            let guard = guard.clone();
            Box::pin(async move {
                let Ok(_running) = guard.try_lock() else {
                    debug!("evict_tokens still running, skipping");
                    return;
                };
                jobs::evict_tokens::run(&tracker, now_ms()).await;
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered evict_tokens job (every {}s)", interval);
        Ok(())
    }
}
