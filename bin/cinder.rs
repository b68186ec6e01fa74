use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use cinder::utils::now_secs;
use cinder::{
    BurnCorrelator, CronScheduler, EventSink, EventSubscriber, NullSink, RedisTokenCache,
    RedpandaPublisher, Settings, SolanaRpcClient, TokenFetcher, TokenRegistry, TokenStore,
    TokenTracker,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let cancellation_token = CancellationToken::new();

    let redis_client = redis::Client::open(settings.redis.url.as_str())
        .context("Invalid Redis URL")?;
    let cache = RedisTokenCache::new(&redis_client).await?;
    let store = TokenStore::new(Arc::new(cache), settings.tracker.cache_ttl());

    let rpc = SolanaRpcClient::new(&settings.rpc)?;
    let fetcher = TokenFetcher::new(Arc::new(rpc));

    let sink: Arc<dyn EventSink> = match settings
        .redpanda
        .as_ref()
        .and_then(RedpandaPublisher::new)
    {
        Some(publisher) => Arc::new(publisher),
        None => Arc::new(NullSink),
    };

    let registry = Arc::new(TokenRegistry::new());
    let correlator = Arc::new(BurnCorrelator::new(
        registry.clone(),
        settings.blacklist.clone(),
    ));

    // Start from the persisted blacklist so a restart does not re-learn it
    match correlator
        .reload_from(correlator.file_path(), now_secs())
        .await
    {
        Ok(count) => info!("Loaded {} blacklist entries", count),
        Err(e) => warn!("Starting with an empty blacklist: {:#}", e),
    }

    let tracker = Arc::new(TokenTracker::new(
        registry,
        correlator.clone(),
        store,
        fetcher,
        sink.clone(),
        settings.tracker.clone(),
        cancellation_token.child_token(),
    ));

    run_tracker(settings, redis_client, tracker, correlator, sink, cancellation_token).await
}

async fn run_tracker(
    settings: Arc<Settings>,
    redis_client: redis::Client,
    tracker: Arc<TokenTracker>,
    correlator: Arc<BurnCorrelator>,
    sink: Arc<dyn EventSink>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    // One subscription task per inbound channel
    let subscriber = Arc::new(EventSubscriber::new(
        redis_client,
        settings.redis.clone(),
        tracker.clone(),
    ));
    let subscriber_handles = subscriber.spawn(cancellation_token.child_token());

    info!("Subscribers started - waiting for burns, pairs and swaps");

    // Create and spawn cron scheduler for background jobs
    // (burn matching, blacklist persistence, cache write-back and eviction)
    let cron_scheduler = CronScheduler::new(
        tracker.clone(),
        settings.tracker.clone(),
        settings.blacklist.clone(),
    );

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - background jobs will run periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    // Set up graceful shutdown signal handler
    info!("Tracker running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    // Cancel subscribers, followers and jobs
    info!("Finishing all tasks...");

    cancellation_token.cancel();

    info!("Waiting for subscribers to stop...");
    for handle in subscriber_handles {
        let _ = handle.await;
    }

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    // Last backup so the next process starts with what we learned
    match correlator.backup_to(correlator.file_path()).await {
        Ok(count) => info!("Saved {} blacklist entries", count),
        Err(e) => error!("Final blacklist backup failed: {:#}", e),
    }

    sink.flush();

    info!("Tracker stopped with {} live tokens", tracker.registry().len());
    Ok(())
}
