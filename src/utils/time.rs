use chrono::Utc;

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current wall-clock time in unix seconds.
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}
