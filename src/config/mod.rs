mod config;

pub use self::config::{
    BlacklistSettings, RedisSettings, RedpandaSettings, RpcSettings, Settings, TrackerSettings,
};
