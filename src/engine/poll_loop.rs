//! The poll loop: one sequential worker driving every phase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::monitor::{ScanReport, WalletMonitor};
use crate::observability::metrics;
use crate::pricing::PriceUpdater;
use crate::store::MemoryStore;
use crate::sweep::{ReclaimQueue, ReclaimReport, SweepProcessor, SweepReport};

/// Outcome of one full cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub scan: Option<ScanReport>,
    pub sweep: Option<SweepReport>,
    pub reclaims: Option<ReclaimReport>,
}

/// Counters shared with the internal API.
#[derive(Default)]
pub struct EngineStats {
    cycles: AtomicU64,
    last: ArcSwapOption<CycleSummary>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn last_cycle(&self) -> Option<Arc<CycleSummary>> {
        self.last.load_full()
    }

    fn record(&self, summary: CycleSummary) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last.store(Some(Arc::new(summary)));
    }
}

/// Time to sleep after a cycle that took `elapsed`. A cycle that overruns
/// the interval still waits `min_wait` before the next one.
pub fn next_wait(interval: Duration, elapsed: Duration, min_wait: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(min_wait)
}

pub struct PollLoop {
    monitor: WalletMonitor,
    sweeper: Option<SweepProcessor>,
    reclaims: Option<Arc<ReclaimQueue>>,
    price: Option<PriceUpdater>,
    snapshot: Option<Arc<MemoryStore>>,
    stats: Arc<EngineStats>,
    interval: Duration,
    min_wait: Duration,
}

impl PollLoop {
    pub fn new(monitor: WalletMonitor, config: &EngineConfig) -> Self {
        Self {
            monitor,
            sweeper: None,
            reclaims: None,
            price: None,
            snapshot: None,
            stats: Arc::new(EngineStats::new()),
            interval: Duration::from_secs(config.poll_interval_secs),
            min_wait: Duration::from_millis(config.min_wait_ms),
        }
    }

    pub fn with_sweeper(mut self, sweeper: SweepProcessor) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    pub fn with_reclaim_queue(mut self, queue: Arc<ReclaimQueue>) -> Self {
        self.reclaims = Some(queue);
        self
    }

    pub fn with_price_updater(mut self, updater: PriceUpdater) -> Self {
        self.price = Some(updater);
        self
    }

    /// Save this store's snapshot after every cycle.
    pub fn with_snapshot(mut self, store: Arc<MemoryStore>) -> Self {
        self.snapshot = Some(store);
        self
    }

    pub fn with_stats(mut self, stats: Arc<EngineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    /// Run cycles until `shutdown` fires. The current cycle always runs to
    /// completion; only the wait between cycles is interrupted.
    pub async fn run(&self, shutdown: Shutdown) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            sweep_enabled = self.sweeper.is_some(),
            "Poll loop started"
        );

        while !shutdown.is_triggered() {
            let started = Instant::now();
            self.run_once().await;

            let wait = next_wait(self.interval, started.elapsed(), self.min_wait);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.wait() => break,
            }
        }

        tracing::info!(cycles = self.stats.cycles(), "Poll loop stopped");
    }

    /// One cycle: price, detect, sweep, reclaim, checkpoint. Phase errors
    /// are logged; the next cycle retries.
    pub async fn run_once(&self) -> CycleSummary {
        let started = Instant::now();

        if let Some(price) = &self.price {
            price.refresh_if_stale().await;
        }

        let scan = match self.monitor.scan().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Detection phase failed");
                None
            }
        };

        let sweep = match &self.sweeper {
            Some(sweeper) => match sweeper.run().await {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(error = %e, "Sweep phase failed");
                    None
                }
            },
            None => None,
        };

        let reclaims = match &self.reclaims {
            Some(queue) => match queue.process_due(Utc::now()).await {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(error = %e, "Reclaim phase failed");
                    None
                }
            },
            None => None,
        };

        self.checkpoint();

        let elapsed = started.elapsed();
        metrics::record_cycle_duration(elapsed.as_secs_f64());
        let summary = CycleSummary {
            finished_at: Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
            scan,
            sweep,
            reclaims,
        };
        self.stats.record(summary.clone());

        if elapsed > self.interval {
            tracing::warn!(
                elapsed_ms = summary.duration_ms,
                interval_secs = self.interval.as_secs(),
                "Cycle overran poll interval"
            );
        }
        summary
    }

    /// Save the snapshot, if one is configured.
    pub fn checkpoint(&self) {
        if let Some(store) = &self.snapshot {
            if let Err(e) = store.save_to_file() {
                tracing::error!(error = %e, "Failed to save custody snapshot");
            }
        }
    }

    /// Shutdown work: attempt every open reclaim, then checkpoint.
    pub async fn finish(&self) {
        if let Some(queue) = &self.reclaims {
            match queue.drain().await {
                Ok(report) => tracing::info!(
                    completed = report.completed,
                    rescheduled = report.rescheduled,
                    abandoned = report.abandoned,
                    "Reclaims drained"
                ),
                Err(e) => tracing::error!(error = %e, "Reclaim drain failed"),
            }
        }
        self.checkpoint();
    }
}
