//! Background cache-sweep task (§C).
//!
//! Periodically evicts expired cache entries so the cache store doesn't
//! grow unbounded between hits. Shaped after the teacher's saga-cleanup
//! task: an `interval` tick racing a `watch` shutdown signal, running
//! until told to stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use athenaeum_pipeline::ResponseCache;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Default)]
pub struct CacheSweepMetrics {
    pub sweeps_run: AtomicU64,
    pub entries_evicted: AtomicU64,
}

impl CacheSweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Runs until `shutdown_rx` reports `true`, sweeping `cache` every
/// `interval` tick in the meantime.
pub async fn cache_sweep_task(
    cache: Arc<ResponseCache>,
    interval_duration: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheSweepMetrics> {
    let metrics = Arc::new(CacheSweepMetrics::new());
    let mut ticker = interval(interval_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = interval_duration.as_secs(), "cache sweep task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("cache sweep task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                let evicted = cache.sweep_expired().await;
                metrics.sweeps_run.fetch_add(1, Ordering::Relaxed);
                metrics.entries_evicted.fetch_add(evicted, Ordering::Relaxed);
                if evicted > 0 {
                    tracing::debug!(evicted, "cache sweep evicted expired entries");
                }
            }
        }
    }

    metrics
}
