use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Redis connection used both as the inbound pub/sub transport and as the
/// token cache.
#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub burns_channel: String,
    pub new_pairs_channel: String,
    pub swaps_channel: String,
    /// Delay before resubscribing after a dropped subscription
    #[serde(default = "default_resubscribe_delay_secs")]
    pub resubscribe_delay_secs: u64,
}

fn default_resubscribe_delay_secs() -> u64 {
    5
}

/// Solana JSON-RPC endpoint used to enrich tokens and sample pools/holders.
#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    pub url: String,
    #[serde(default = "default_rpc_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on in-flight RPC requests across all tasks
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_requests() -> usize {
    16
}

/// Redpanda (Kafka-compatible) sink configuration.
///
/// When enabled, closed buckets, samples and terminal summaries are published
/// to `{prefix}.prices`, `{prefix}.volumes`, `{prefix}.burns`,
/// `{prefix}.holders` and `{prefix}.tokens`.
#[derive(Debug, Deserialize, Clone)]
pub struct RedpandaSettings {
    /// Enable/disable Redpanda publishing
    #[serde(default)]
    pub enabled: bool,
    /// Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[serde(default = "default_redpanda_brokers")]
    pub brokers: String,
    #[serde(default = "default_redpanda_topic_prefix")]
    pub topic_prefix: String,
}

fn default_redpanda_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_redpanda_topic_prefix() -> String {
    "cinder".to_string()
}

/// Registry lifetime and sampling configuration.
///
/// All values are seconds unless the name says otherwise.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerSettings {
    /// Re-cache a token once its last cache write is older than this
    #[serde(default = "default_cache_timeout_seconds")]
    pub cache_timeout_seconds: u64,
    /// A token with no mutation for this long is dead and gets evicted
    #[serde(default = "default_stale_if_dead_for_seconds")]
    pub stale_if_dead_for_seconds: u64,
    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,
    /// Price sampling cadence; also the burn/volume bucket width
    #[serde(default = "default_sample_interval")]
    pub price_interval: u64,
    #[serde(default = "default_follow_time")]
    pub price_follow_time: u64,
    #[serde(default = "default_sample_interval")]
    pub owners_interval: u64,
    #[serde(default = "default_follow_time")]
    pub owners_follow_time: u64,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

fn default_cache_timeout_seconds() -> u64 {
    60
}

fn default_stale_if_dead_for_seconds() -> u64 {
    600
}

fn default_cache_ttl_minutes() -> u64 {
    60
}

fn default_sample_interval() -> u64 {
    60
}

fn default_follow_time() -> u64 {
    3600
}

fn default_eviction_interval_secs() -> u64 {
    1
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            cache_timeout_seconds: default_cache_timeout_seconds(),
            stale_if_dead_for_seconds: default_stale_if_dead_for_seconds(),
            cache_ttl_minutes: default_cache_ttl_minutes(),
            price_interval: default_sample_interval(),
            price_follow_time: default_follow_time(),
            owners_interval: default_sample_interval(),
            owners_follow_time: default_follow_time(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

impl TrackerSettings {
    /// Bucket width for burns and volume, in event-time seconds.
    pub fn bucket_interval(&self) -> i64 {
        self.price_interval as i64
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }
}

/// Burn correlation and blacklist persistence configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct BlacklistSettings {
    #[serde(default = "default_blacklist_file_path")]
    pub file_path: String,
    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,
    /// Must differ from the backup interval so reads and writes do not collide
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Blacklist entries untouched for this long are removed
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
    #[serde(default = "default_promotion_hits")]
    pub promotion_hits: u32,
    #[serde(default = "default_promotion_min_age_secs")]
    pub promotion_min_age_secs: u64,
    /// Unknown records with no hit for this long are dropped
    #[serde(default = "default_unknown_ttl_secs")]
    pub unknown_ttl_secs: u64,
}

fn default_blacklist_file_path() -> String {
    "blacklist.csv".to_string()
}

fn default_backup_interval_secs() -> u64 {
    10
}

fn default_reload_interval_secs() -> u64 {
    25
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_expiry_secs() -> u64 {
    300
}

fn default_promotion_hits() -> u32 {
    5
}

fn default_promotion_min_age_secs() -> u64 {
    300
}

fn default_unknown_ttl_secs() -> u64 {
    3600
}

impl Default for BlacklistSettings {
    fn default() -> Self {
        Self {
            file_path: default_blacklist_file_path(),
            backup_interval_secs: default_backup_interval_secs(),
            reload_interval_secs: default_reload_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            expiry_secs: default_expiry_secs(),
            promotion_hits: default_promotion_hits(),
            promotion_min_age_secs: default_promotion_min_age_secs(),
            unknown_ttl_secs: default_unknown_ttl_secs(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, with `CINDER__SECTION__KEY`
/// environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub redis: RedisSettings,
    pub rpc: RpcSettings,
    #[serde(default)]
    pub redpanda: Option<RedpandaSettings>,
    #[serde(default)]
    pub tracker: TrackerSettings,
    #[serde(default)]
    pub blacklist: BlacklistSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("CINDER").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tracker;
        let b = &self.blacklist;

        let intervals = [
            ("tracker.price_interval", t.price_interval),
            ("tracker.owners_interval", t.owners_interval),
            ("tracker.eviction_interval_secs", t.eviction_interval_secs),
            ("blacklist.backup_interval_secs", b.backup_interval_secs),
            ("blacklist.reload_interval_secs", b.reload_interval_secs),
            ("blacklist.cleanup_interval_secs", b.cleanup_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Message(format!("{} must be greater than 0", name)));
        }

        if b.backup_interval_secs == b.reload_interval_secs {
            return Err(ConfigError::Message(
                "blacklist.backup_interval_secs and blacklist.reload_interval_secs must differ"
                    .to_string(),
            ));
        }

        if b.promotion_hits == 0 {
            return Err(ConfigError::Message(
                "blacklist.promotion_hits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
redis:
  url: "redis://127.0.0.1:6379"
  burns_channel: "burns"
  new_pairs_channel: "new_pairs"
  swaps_channel: "swaps"
rpc:
  url: "http://127.0.0.1:8899"
"#;

    fn load(yaml: &str) -> Result<Settings, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let settings = load(MINIMAL).unwrap();

        assert!(settings.redpanda.is_none());
        assert_eq!(settings.tracker.price_interval, 60);
        assert_eq!(settings.tracker.eviction_interval_secs, 1);
        assert_eq!(settings.blacklist.promotion_hits, 5);
        assert_eq!(settings.blacklist.promotion_min_age_secs, 300);
        assert_eq!(settings.blacklist.backup_interval_secs, 10);
        assert_eq!(settings.blacklist.reload_interval_secs, 25);
        assert_eq!(settings.rpc.max_concurrent_requests, 16);
        assert_eq!(settings.tracker.cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_rejects_colliding_blacklist_intervals() {
        let yaml = format!(
            "{}\nblacklist:\n  backup_interval_secs: 20\n  reload_interval_secs: 20\n",
            MINIMAL
        );
        assert!(load(&yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let yaml = format!("{}\ntracker:\n  price_interval: 0\n", MINIMAL);
        let err = load(&yaml).unwrap_err();
        assert!(err.to_string().contains("tracker.price_interval"));
    }
}
