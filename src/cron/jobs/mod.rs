pub mod blacklist;
pub mod evict_tokens;
pub mod match_unknown_burns;
