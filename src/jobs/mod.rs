//! Enrichment run: backlog slice → resume filter → scheduler → cache store

pub mod enrichment;
pub mod progress;
pub mod resume;
pub mod shard;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub use enrichment::{FetchMode, PipelineStats, RunSummary, Scheduler, SchedulerConfig, StatsSnapshot};
pub use progress::ProgressReporter;
pub use resume::filter_pending;
pub use shard::{ShardError, ShardSpec, partition};

use crate::db::BacklogLoad;
use crate::types::InfoHash;

/// Options for a single run over a loaded backlog slice
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Reprocess items even if the cache already holds them
    pub force: bool,
    pub progress_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            progress_interval: Duration::from_millis(1000),
        }
    }
}

/// Filter out completed work, then drain the rest through the scheduler
/// while a progress reporter logs counters.
pub async fn run_enrichment(
    scheduler: Arc<Scheduler>,
    backlog: BacklogLoad,
    done: &HashSet<InfoHash>,
    options: &RunOptions,
) -> RunSummary {
    let stats = scheduler.stats();
    stats.add_malformed(backlog.malformed);

    let (pending, skipped) = if options.force {
        (backlog.items, 0)
    } else {
        filter_pending(backlog.items, done)
    };
    stats.add_skipped(skipped);
    stats.set_total(pending.len());

    info!(
        pending = pending.len(),
        skipped,
        malformed = backlog.malformed,
        force = options.force,
        "Work queue ready"
    );

    let reporter = ProgressReporter::start(stats, options.progress_interval);
    let summary = scheduler.run(pending).await;
    reporter.stop().await;
    summary
}
