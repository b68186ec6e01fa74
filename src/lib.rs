pub mod cache;
pub mod config;
pub mod cron;
pub mod models;
pub mod pubsub;
pub mod tracker;
pub mod utils;
pub mod worker;

pub use cache::{RedisTokenCache, TokenStore};
pub use config::Settings;
pub use cron::CronScheduler;
pub use pubsub::{EventSink, EventSubscriber, NullSink, RedpandaPublisher};
pub use tracker::{BurnCorrelator, TokenRegistry, TokenTracker};
pub use worker::{SolanaRpcClient, TokenFetcher};
