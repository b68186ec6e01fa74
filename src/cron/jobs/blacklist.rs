//! Jobs that persist, reload and expire the burn blacklist.
//!
//! Memory is authoritative: file errors are returned to the scheduler, which
//! logs them and tries again on the next tick.

use anyhow::Result;
use log::{debug, info};

use crate::tracker::BurnCorrelator;

pub async fn backup(correlator: &BurnCorrelator) -> Result<()> {
    let path = correlator.file_path();
    let written = correlator.backup_to(path).await?;
    debug!("Backed up {} blacklist entries to {}", written, path.display());
    Ok(())
}

pub async fn reload(correlator: &BurnCorrelator, now: i64) -> Result<()> {
    let path = correlator.file_path();
    let merged = correlator.reload_from(path, now).await?;
    debug!("Reloaded {} blacklist entries from {}", merged, path.display());
    Ok(())
}

pub async fn cleanup(correlator: &BurnCorrelator, now: i64) {
    let (expired, dropped) = correlator.cleanup(now).await;
    if expired + dropped > 0 {
        info!(
            "Blacklist cleanup: {} entries expired, {} idle unknown tokens dropped",
            expired, dropped
        );
    }
}
