use crate::models::{SwapEvent, TokenAggregate, VolumeBucket};

/// Fold a swap into the token's volume series and refresh `last_updated`.
///
/// Returns the bucket this swap closed, if it opened a new one.
pub fn apply_swap(
    aggregate: &mut TokenAggregate,
    swap: &SwapEvent,
    interval: i64,
    now_ms: i64,
) -> Option<VolumeBucket> {
    let closed = aggregate.volumes.record(
        swap.transaction_type,
        &swap.amount_sol,
        swap.block_time_secs(),
        interval,
    );
    aggregate.touch(now_ms);
    closed
}
