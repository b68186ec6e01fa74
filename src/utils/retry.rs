//! Bounded retry with exponential backoff.
//!
//! Shared by the cache client and the RPC-backed fetchers: a small fixed number
//! of attempts, doubling the delay after each failure.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use log::debug;

/// Maximum attempts for collaborator calls (cache, RPC)
const MAX_RETRIES: u32 = 3;

/// Delay before the second attempt (exponential backoff base)
const RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES, Duration::from_millis(RETRY_DELAY_MS))
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
///
/// Waits `base_delay * 2^attempt` between attempts (0.5s, 1s, ... by default).
/// The last error is returned with context naming the operation.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!("{} failed on attempt {}: {:#}", label, attempt + 1, e);
                last_error = Some(e);
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.base_delay * 2_u32.pow(attempt)).await;
                }
            },
        }
    }

    let err = last_error.unwrap_or_else(|| anyhow!("no attempts were made"));
    Err(err.context(format!(
        "{} failed after {} attempts",
        label, policy.max_attempts
    )))
}
