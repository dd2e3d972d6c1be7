//! Enrichment scheduler
//!
//! Drains the pending queue with at most `concurrency` items in flight. Each
//! item races a swarm metadata lookup against its timeout, falls back to the
//! title analysis when the swarm loses, and is upserted before its slot is
//! released. A failure inside one item never affects another.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::db::DetailsStore;
use crate::services::bitrate::bitrate;
use crate::services::swarm::{SwarmClient, SwarmError, SwarmMetadata};
use crate::services::title_analyzer::{TitleAnalysis, TitleAnalyzer};
use crate::services::torrent_metadata::summarize_files;
use crate::types::{FetchOutcome, InfoHash, ItemReport, TorrentDetails, WorkItem};

/// Stored file list when the swarm lookup did not succeed
pub const INFO_ONLY_PLACEHOLDER: &str = "(info_only)";
/// Stored file list for runs that never contact the swarm
pub const TITLE_PARSE_PLACEHOLDER: &str = "(title_parse)";

/// Where authoritative metadata comes from
#[derive(Clone)]
pub enum FetchMode {
    Swarm(Arc<dyn SwarmClient>),
    TitleOnly,
}

impl std::fmt::Debug for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Swarm(_) => f.write_str("Swarm"),
            FetchMode::TitleOnly => f.write_str("TitleOnly"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum items in flight
    pub concurrency: usize,
    /// Per-item swarm budget
    pub timeout: Duration,
    /// File names kept per torrent
    pub max_files: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 25,
            timeout: Duration::from_millis(12_000),
            max_files: 15,
        }
    }
}

/// Live counters shared with the progress reporter
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    total: AtomicUsize,
    processed: AtomicUsize,
    active: AtomicUsize,
    skipped: AtomicUsize,
    malformed: AtomicUsize,
    success: AtomicUsize,
    timeout: AtomicUsize,
    error: AtomicUsize,
    error_add: AtomicUsize,
    title_only: AtomicUsize,
    persist_failed: AtomicUsize,
}

/// Point-in-time copy of [`PipelineStats`]; also the final run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total: usize,
    pub processed: usize,
    pub active: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub success: usize,
    pub timeout: usize,
    pub error: usize,
    pub error_add: usize,
    pub title_only: usize,
    pub persist_failed: usize,
    pub elapsed_secs: f64,
}

pub type RunSummary = StatsSnapshot;

impl StatsSnapshot {
    /// Items persisted from a fallback result
    pub fn fallback(&self) -> usize {
        self.timeout + self.error + self.error_add + self.title_only
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total as f64 * 1000.0).round() / 10.0
    }

    pub fn items_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        (self.processed as f64 / self.elapsed_secs * 100.0).round() / 100.0
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            total: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            malformed: AtomicUsize::new(0),
            success: AtomicUsize::new(0),
            timeout: AtomicUsize::new(0),
            error: AtomicUsize::new(0),
            error_add: AtomicUsize::new(0),
            title_only: AtomicUsize::new(0),
            persist_failed: AtomicUsize::new(0),
        }
    }
}

impl PipelineStats {
    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, n: usize) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_malformed(&self, n: usize) {
        self.malformed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn record(&self, report: &ItemReport) {
        let counter = match report.outcome {
            FetchOutcome::Success => &self.success,
            FetchOutcome::Timeout => &self.timeout,
            FetchOutcome::Error => &self.error,
            FetchOutcome::ErrorAdd => &self.error_add,
            FetchOutcome::TitleOnly => &self.title_only,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if !report.persisted {
            self.persist_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            error_add: self.error_add.load(Ordering::Relaxed),
            title_only: self.title_only.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Decrements the active counter when an item leaves the pool, even on panic
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded worker pool over the pending queue
pub struct Scheduler {
    mode: FetchMode,
    store: Arc<dyn DetailsStore>,
    analyzer: TitleAnalyzer,
    config: SchedulerConfig,
    stats: Arc<PipelineStats>,
}

impl Scheduler {
    pub fn new(mode: FetchMode, store: Arc<dyn DetailsStore>, config: SchedulerConfig) -> Self {
        Self {
            mode,
            store,
            analyzer: TitleAnalyzer::default(),
            config,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn with_analyzer(mut self, analyzer: TitleAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Process every item, admitting a new one as soon as a slot frees up.
    /// Returns once the queue is empty and nothing is in flight.
    pub async fn run(self: &Arc<Self>, items: Vec<WorkItem>) -> RunSummary {
        let concurrency = self.config.concurrency.max(1);
        let slots = Arc::new(Semaphore::new(concurrency));
        let mut tasks: JoinSet<ItemReport> = JoinSet::new();

        info!(
            items = items.len(),
            concurrency,
            mode = ?self.mode,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Starting enrichment"
        );

        for item in items {
            let Ok(permit) = slots.clone().acquire_owned().await else {
                break;
            };

            let scheduler = Arc::clone(self);
            tasks.spawn(async move {
                let report = scheduler.process(item).await;
                drop(permit);
                report
            });

            while let Some(joined) = tasks.try_join_next() {
                self.reap(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.reap(joined);
        }

        let summary = self.stats.snapshot();
        info!(
            processed = summary.processed,
            success = summary.success,
            fallback = summary.fallback(),
            skipped = summary.skipped,
            malformed = summary.malformed,
            persist_failed = summary.persist_failed,
            elapsed_secs = summary.elapsed_secs,
            "Enrichment finished"
        );
        summary
    }

    fn reap(&self, joined: Result<ItemReport, JoinError>) {
        if let Err(e) = joined {
            error!(error = %e, "Enrichment task failed outside the item boundary");
        }
    }

    /// Run one item to a terminal state and persist the result.
    ///
    /// Never fails: swarm errors, panics and timeouts become fallback outcomes,
    /// and a failed upsert is logged and reported through `persisted`.
    pub async fn process(&self, item: WorkItem) -> ItemReport {
        let _active = ActiveGuard::enter(&self.stats.active);
        let analysis = self.analyzer.analyze(&item.title);

        let (details, outcome) = match &self.mode {
            FetchMode::TitleOnly => (
                self.fallback_details(&item, &analysis, TITLE_PARSE_PLACEHOLDER),
                FetchOutcome::TitleOnly,
            ),
            FetchMode::Swarm(swarm) => match self.fetch_swarm(swarm, &item.info_hash).await {
                Ok(metadata) => (
                    self.swarm_details(&item, &analysis, metadata),
                    FetchOutcome::Success,
                ),
                Err(outcome) => (
                    self.fallback_details(&item, &analysis, INFO_ONLY_PLACEHOLDER),
                    outcome,
                ),
            },
        };

        let persisted = match self.store.upsert(&details).await {
            Ok(()) => true,
            Err(e) => {
                warn!(info_hash = %item.info_hash, error = %e, "Failed to persist torrent details");
                false
            }
        };

        debug!(
            info_hash = %item.info_hash,
            outcome = %outcome,
            resolution = %details.resolution,
            hdr = %details.hdr_type,
            "Item processed"
        );

        let report = ItemReport {
            details,
            outcome,
            persisted,
        };
        self.stats.record(&report);
        report
    }

    /// Race the swarm lookup against the timeout. The lookup runs in its own
    /// task so a panic is contained and a timeout can abort it.
    async fn fetch_swarm(
        &self,
        swarm: &Arc<dyn SwarmClient>,
        info_hash: &InfoHash,
    ) -> Result<SwarmMetadata, FetchOutcome> {
        let swarm = Arc::clone(swarm);
        let hash = info_hash.clone();
        let mut lookup = tokio::spawn(async move { swarm.fetch_metadata(&hash).await });

        tokio::select! {
            joined = &mut lookup => match joined {
                Ok(Ok(metadata)) => Ok(metadata),
                Ok(Err(e @ SwarmError::Rejected(_))) => {
                    debug!(info_hash = %info_hash, error = %e, "Swarm client rejected torrent");
                    Err(FetchOutcome::ErrorAdd)
                }
                Ok(Err(e)) => {
                    debug!(info_hash = %info_hash, error = %e, "Swarm lookup failed");
                    Err(FetchOutcome::Error)
                }
                Err(e) => {
                    warn!(info_hash = %info_hash, error = %e, "Swarm lookup panicked");
                    Err(FetchOutcome::Error)
                }
            },
            _ = tokio::time::sleep(self.config.timeout) => {
                lookup.abort();
                debug!(info_hash = %info_hash, "Swarm lookup timed out");
                Err(FetchOutcome::Timeout)
            }
        }
    }

    fn fallback_details(&self, item: &WorkItem, analysis: &TitleAnalysis, placeholder: &str) -> TorrentDetails {
        TorrentDetails {
            info_hash: item.info_hash.clone(),
            resolution: analysis.resolution.clone(),
            size: item.size_scraped,
            files: vec![placeholder.to_string()],
            hdr_type: analysis.hdr_type.clone(),
            file_type: analysis.container.clone(),
            codec: analysis.codec.clone(),
            bitrate: bitrate(Some(item.size_scraped), Some(item.runtime_minutes)),
            audio: analysis.audio(),
        }
    }

    fn swarm_details(&self, item: &WorkItem, analysis: &TitleAnalysis, metadata: SwarmMetadata) -> TorrentDetails {
        let summary = summarize_files(&metadata.files, self.config.max_files);
        let size = if metadata.total_size > 0 {
            metadata.total_size
        } else {
            item.size_scraped
        };

        TorrentDetails {
            info_hash: item.info_hash.clone(),
            resolution: analysis.resolution.clone(),
            size,
            files: summary.files,
            hdr_type: analysis.hdr_type.clone(),
            file_type: summary.file_type,
            codec: analysis.codec.clone(),
            bitrate: bitrate(Some(size), Some(item.runtime_minutes)),
            audio: analysis.audio(),
        }
    }
}
