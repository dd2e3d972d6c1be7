//! Periodic progress logging for an enrichment run

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::enrichment::{PipelineStats, StatsSnapshot};

/// Background task that logs pipeline counters every `interval`
pub struct ProgressReporter {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn start(stats: Arc<PipelineStats>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            progress_loop(stats, interval, token).await;
        });
        Self { cancel, handle }
    }

    /// Stop reporting and wait for the task to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn progress_loop(stats: Arc<PipelineStats>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(10)));
    // The first tick completes immediately
    interval.tick().await;

    let mut last_processed = 0usize;
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = stats.snapshot();
                let recent = recent_rate(snapshot.processed, last_processed, last_tick.elapsed());
                last_processed = snapshot.processed;
                last_tick = Instant::now();
                log_progress(&snapshot, recent);
            }
        }
    }
}

fn recent_rate(processed: usize, last_processed: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let delta = processed.saturating_sub(last_processed) as f64;
    (delta / secs * 100.0).round() / 100.0
}

fn log_progress(snapshot: &StatsSnapshot, recent_rate: f64) {
    info!(
        processed = snapshot.processed,
        total = snapshot.total,
        percent = snapshot.percent(),
        success = snapshot.success,
        fallback = snapshot.fallback(),
        skipped = snapshot.skipped,
        malformed = snapshot.malformed,
        active = snapshot.active,
        items_per_sec = recent_rate,
        "Enrichment progress"
    );
}
