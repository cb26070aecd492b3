//! Out-of-band cache maintenance.
//!
//! The size sweep runs opportunistically from the engine's miss path; this
//! loop covers the case where nothing misses for a long time but the store
//! has already outgrown its cap.

use std::time::Duration;

use crate::cache::ResponseCache;

/// Periodically trim the body store down to its configured size cap.
///
/// Runs until the task is dropped; intended to be `tokio::spawn`ed once at
/// process start next to the engine it sweeps.
pub async fn run_size_sweep(cache: ResponseCache, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match cache.evict_exceeding().await {
            Ok(0) => {}
            Ok(evicted) => tracing::info!(evicted, "size sweep evicted entries"),
            Err(e) => tracing::warn!(error = %e, "size sweep failed"),
        }
    }
}
