//! Job to hand parked burns over to tokens that got registered since.

use log::info;

use crate::tracker::TokenTracker;

pub async fn run(tracker: &TokenTracker) {
    let merged = tracker.match_unknown_burns().await;
    if merged > 0 {
        let (unknown, blacklisted) = tracker.correlator().sizes().await;
        info!(
            "Matched {} parked tokens ({} unknown, {} blacklisted left)",
            merged, unknown, blacklisted
        );
    }
}
