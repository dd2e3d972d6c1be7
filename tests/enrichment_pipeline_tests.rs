//! Integration tests for the enrichment pipeline
//!
//! These tests drive the scheduler against fake swarm clients and stores:
//! - Concurrency ceiling and termination
//! - Timeout, error and panic fallbacks
//! - Resume and idempotence over a real SQLite cache
//! - Sharded backlog reads

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;

use torrent_enricher::db::{
    self, BacklogLoad, BacklogRepository, DetailsStore, SqliteDetailsStore, StoreError,
};
use torrent_enricher::jobs::{self, FetchMode, RunOptions, Scheduler, SchedulerConfig, ShardSpec};
use torrent_enricher::services::torrent_metadata::TorrentFileInfo;
use torrent_enricher::services::{
    ParsedQuality, QualityHeuristic, SwarmClient, SwarmError, SwarmMetadata, TitleAnalyzer,
};
use torrent_enricher::types::{FetchOutcome, InfoHash, TorrentDetails, WorkItem};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    Hang,
    Fail,
    Reject,
    Panic,
}

/// Counts lookups that were dropped before finishing
struct DropGuard<'a> {
    finished: bool,
    cancelled: &'a AtomicUsize,
}

impl Drop for DropGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeSwarm {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_seen: AtomicUsize,
    cancelled: AtomicUsize,
}

impl FakeSwarm {
    fn new(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        })
    }
}

fn swarm_files() -> Vec<TorrentFileInfo> {
    vec![
        TorrentFileInfo {
            path: PathBuf::from("Sample/sample.mkv"),
            name: "sample.mkv".to_string(),
            size: 100,
        },
        TorrentFileInfo {
            path: PathBuf::from("Movie.2021.2160p.mp4"),
            name: "Movie.2021.2160p.mp4".to_string(),
            size: 3_000_000_000,
        },
    ]
}

#[async_trait]
impl SwarmClient for FakeSwarm {
    async fn fetch_metadata(&self, _info_hash: &InfoHash) -> Result<SwarmMetadata, SwarmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(current, Ordering::SeqCst);

        let mut guard = DropGuard {
            finished: false,
            cancelled: &self.cancelled,
        };

        tokio::time::sleep(self.delay).await;
        let result = match self.behavior {
            Behavior::Succeed => Ok(SwarmMetadata {
                total_size: 3_000_000_100,
                files: swarm_files(),
            }),
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail => Err(SwarmError::Join("no peers".to_string())),
            Behavior::Reject => Err(SwarmError::Rejected("bad magnet".to_string())),
            Behavior::Panic => panic!("peer sent garbage"),
        };

        guard.finished = true;
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<HashMap<InfoHash, TorrentDetails>>,
    upserts: AtomicUsize,
    fail: bool,
}

impl MemoryStore {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn get(&self, hash: &InfoHash) -> Option<TorrentDetails> {
        self.rows.lock().get(hash).cloned()
    }
}

#[async_trait]
impl DetailsStore for MemoryStore {
    async fn upsert(&self, details: &TorrentDetails) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.rows.lock().insert(details.info_hash.clone(), details.clone());
        Ok(())
    }
}

fn hash(n: usize) -> InfoHash {
    InfoHash::parse(&format!("{:040X}", n)).unwrap()
}

fn item(n: usize, title: &str) -> WorkItem {
    WorkItem {
        info_hash: hash(n),
        title: title.to_string(),
        size_scraped: 1_500_000_000,
        runtime_minutes: 120,
        source_row_id: n as i64,
        tmdb_id: Some(550),
    }
}

fn config(concurrency: usize, timeout_ms: u64) -> SchedulerConfig {
    SchedulerConfig {
        concurrency,
        timeout: Duration::from_millis(timeout_ms),
        max_files: 15,
    }
}

const DV_TITLE: &str = "Movie.2021.2160p.HDR10.Dolby.Vision.Red.Head.Sound.mkv";

// ============================================================================
// Scheduler
// ============================================================================

mod scheduler {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_active_items_never_exceed_ceiling() {
        let swarm = FakeSwarm::new(Behavior::Succeed, Duration::from_millis(20));
        let store = Arc::new(MemoryStore::default());
        let scheduler = Arc::new(Scheduler::new(
            FetchMode::Swarm(swarm.clone()),
            store.clone(),
            config(5, 5_000),
        ));

        let items: Vec<_> = (1..=40).map(|n| item(n, DV_TITLE)).collect();
        let summary = scheduler.run(items).await;

        let max_seen = swarm.max_seen.load(Ordering::SeqCst);
        assert!(max_seen <= 5, "max in flight was {}", max_seen);
        assert!(max_seen > 1, "items were not processed concurrently");
        assert_eq!(swarm.calls.load(Ordering::SeqCst), 40);
        assert_eq!(summary.processed, 40);
        assert_eq!(summary.success, 40);
        assert_eq!(summary.active, 0);
        assert_eq!(store.rows.lock().len(), 40);
    }

    #[tokio::test]
    async fn test_success_uses_swarm_metadata() {
        let swarm = FakeSwarm::new(Behavior::Succeed, Duration::ZERO);
        let store = Arc::new(MemoryStore::default());
        let scheduler = Scheduler::new(FetchMode::Swarm(swarm), store.clone(), config(1, 5_000));

        let report = scheduler.process(item(1, DV_TITLE)).await;

        assert_eq!(report.outcome, FetchOutcome::Success);
        assert!(report.persisted);
        let details = report.details;
        assert_eq!(details.size, 3_000_000_100);
        assert_eq!(details.files, vec!["sample.mkv", "Movie.2021.2160p.mp4"]);
        assert_eq!(details.file_type, "mp4");
        assert_eq!(details.bitrate, Some(3.33));
        assert_eq!(details.resolution, "4K");
        assert_eq!(details.hdr_type, "Dolby Vision");
        assert!(details.audio.contains("Red Head Sound"));
        assert_eq!(store.get(&hash(1)), Some(details));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_within_budget() {
        let swarm = FakeSwarm::new(Behavior::Hang, Duration::ZERO);
        let store = Arc::new(MemoryStore::default());
        let scheduler = Scheduler::new(FetchMode::Swarm(swarm.clone()), store.clone(), config(1, 100));

        let started = Instant::now();
        let report = scheduler.process(item(1, "Show.S01.720p.5.1.MVO")).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(600), "took {:?}", elapsed);
        assert_matches!(report.outcome, FetchOutcome::Timeout);
        assert!(report.persisted);

        let details = report.details;
        assert_eq!(details.files, vec!["(info_only)"]);
        assert_eq!(details.size, 1_500_000_000);
        assert_eq!(details.resolution, "720p");
        assert_eq!(details.hdr_type, "SDR");
        assert_eq!(details.file_type, "mkv");
        assert_eq!(details.audio, "5.1 | MVO");
        assert_eq!(details.bitrate, Some(1.67));

        // The abandoned lookup is aborted, not left running
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(swarm.cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let cases = [
            (Behavior::Fail, FetchOutcome::Error),
            (Behavior::Reject, FetchOutcome::ErrorAdd),
            (Behavior::Panic, FetchOutcome::Error),
        ];

        for (behavior, expected) in cases {
            let swarm = FakeSwarm::new(behavior, Duration::ZERO);
            let store = Arc::new(MemoryStore::default());
            let scheduler = Scheduler::new(FetchMode::Swarm(swarm), store.clone(), config(1, 5_000));

            let report = scheduler.process(item(7, DV_TITLE)).await;
            assert_eq!(report.outcome, expected, "{:?}", behavior);
            assert_eq!(report.details.files, vec!["(info_only)"]);
            assert!(store.get(&hash(7)).is_some());
        }
    }

    #[tokio::test]
    async fn test_title_only_never_contacts_swarm() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = Arc::new(Scheduler::new(FetchMode::TitleOnly, store.clone(), config(4, 5_000)));

        let summary = scheduler.run((1..=5).map(|n| item(n, DV_TITLE)).collect()).await;

        assert_eq!(summary.title_only, 5);
        assert_eq!(summary.fallback(), 5);
        let details = store.get(&hash(3)).unwrap();
        assert_eq!(details.files, vec!["(title_parse)"]);
        assert_eq!(details.size, 1_500_000_000);
        assert_eq!(details.bitrate, Some(1.67));
    }

    struct FixedQuality;

    impl QualityHeuristic for FixedQuality {
        fn parse(&self, _title: &str) -> ParsedQuality {
            ParsedQuality {
                resolution: Some("720p".to_string()),
                codec: Some("AV1".to_string()),
                container: Some("webm".to_string()),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn test_custom_analyzer_fills_untagged_title() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = Scheduler::new(FetchMode::TitleOnly, store.clone(), config(1, 5_000))
            .with_analyzer(TitleAnalyzer::new(Arc::new(FixedQuality)));

        let report = scheduler.process(item(1, "Some Movie 2021")).await;

        assert_eq!(report.outcome, FetchOutcome::TitleOnly);
        let details = store.get(&hash(1)).unwrap();
        assert_eq!(details.resolution, "720p");
        assert_eq!(details.codec.as_deref(), Some("AV1"));
        assert_eq!(details.file_type, "webm");
        assert_eq!(details.hdr_type, "SDR");
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::failing());
        let scheduler = Arc::new(Scheduler::new(FetchMode::TitleOnly, store.clone(), config(2, 5_000)));

        let summary = scheduler.run((1..=3).map(|n| item(n, DV_TITLE)).collect()).await;

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.persist_failed, 3);
        assert_eq!(store.upserts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_queue_terminates() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = Arc::new(Scheduler::new(FetchMode::TitleOnly, store, config(3, 5_000)));
        let summary = scheduler.run(Vec::new()).await;
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.active, 0);
    }
}

// ============================================================================
// Resume and persistence
// ============================================================================

mod resume {
    use super::*;
    use pretty_assertions::assert_eq;

    fn backlog(n: usize) -> BacklogLoad {
        BacklogLoad {
            items: (1..=n).map(|i| item(i, DV_TITLE)).collect(),
            malformed: 2,
        }
    }

    #[tokio::test]
    async fn test_second_run_reprocesses_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("torrents_data.db");
        let options = RunOptions {
            force: false,
            progress_interval: Duration::from_millis(20),
        };

        let done = db::load_done_hashes(&path).await.unwrap();
        assert!(done.is_empty());

        let store = Arc::new(SqliteDetailsStore::open(&path).await.unwrap());
        let scheduler = Arc::new(Scheduler::new(FetchMode::TitleOnly, store.clone(), config(4, 5_000)));
        let first = jobs::run_enrichment(scheduler, backlog(10), &done, &options).await;
        assert_eq!(first.processed, 10);
        assert_eq!(first.malformed, 2);
        store.close().await;

        let done = db::load_done_hashes(&path).await.unwrap();
        assert_eq!(done.len(), 10);

        let store = Arc::new(SqliteDetailsStore::open(&path).await.unwrap());
        let scheduler = Arc::new(Scheduler::new(FetchMode::TitleOnly, store.clone(), config(4, 5_000)));
        let second = jobs::run_enrichment(scheduler, backlog(10), &done, &options).await;
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 10);
        assert_eq!(store.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_force_reprocesses_done_items() {
        let store = Arc::new(MemoryStore::default());
        let done = (1..=3).map(hash).collect();
        let scheduler = Arc::new(Scheduler::new(FetchMode::TitleOnly, store.clone(), config(2, 5_000)));
        let options = RunOptions {
            force: true,
            ..Default::default()
        };

        let summary = jobs::run_enrichment(scheduler, backlog(3), &done, &options).await;
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteDetailsStore::open(&dir.path().join("cache.db")).await.unwrap());

        let title_only = Scheduler::new(FetchMode::TitleOnly, store.clone(), config(1, 5_000));
        title_only.process(item(1, DV_TITLE)).await;

        let swarm = FakeSwarm::new(Behavior::Succeed, Duration::ZERO);
        let with_swarm = Scheduler::new(FetchMode::Swarm(swarm), store.clone(), config(1, 5_000));
        with_swarm.process(item(1, DV_TITLE)).await;

        assert_eq!(store.count().await.unwrap(), 1);
        let row = store.get(&hash(1)).await.unwrap().unwrap();
        assert_eq!(row.file_type, "mp4");
        assert_eq!(row.files, vec!["sample.mkv", "Movie.2021.2160p.mp4"]);
    }
}

// ============================================================================
// Backlog reader
// ============================================================================

mod backlog {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn seed(dir: &std::path::Path) -> (PathBuf, PathBuf) {
        let backlog_path = dir.join("torrents.db");
        let catalog_path = dir.join("catalog.db");

        let pool = SqlitePoolOptions::new()
            .connect_with(SqliteConnectOptions::new().filename(&backlog_path).create_if_missing(true))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE torrents (magnet TEXT, torrent_title TEXT, size TEXT, tmdb_id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        for n in 1..=20usize {
            let magnet = if n == 13 {
                "magnet:?xt=urn:btih:broken".to_string()
            } else {
                format!("magnet:?xt=urn:btih:{:040x}&dn=x", n)
            };
            sqlx::query("INSERT INTO torrents (magnet, torrent_title, size, tmdb_id) VALUES (?, ?, '1.5 GB', ?)")
                .bind(magnet)
                .bind(format!("Movie {} 1080p", n))
                .bind(if n % 2 == 0 { 550 } else { 680 })
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;

        let pool = SqlitePoolOptions::new()
            .connect_with(SqliteConnectOptions::new().filename(&catalog_path).create_if_missing(true))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE items_minimal (id INTEGER PRIMARY KEY, runtime INTEGER, title TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO items_minimal (id, runtime, title) VALUES (550, 139, 'Fight Club'), (680, NULL, 'Pulp Fiction')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        (backlog_path, catalog_path)
    }

    #[tokio::test]
    async fn test_shards_cover_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let (backlog_path, catalog_path) = seed(dir.path()).await;

        let runtimes = db::load_runtimes(&catalog_path).await.unwrap();
        assert_eq!(runtimes, HashMap::from([(550, 139)]));

        let repo = BacklogRepository::open(&backlog_path).await.unwrap();
        let mut row_ids = Vec::new();
        let mut malformed = 0;
        for shard_id in 0..3 {
            let shard = ShardSpec::new(shard_id, 3).unwrap();
            let load = repo.load_shard(shard, None, &runtimes).await.unwrap();
            assert!(load.items.iter().all(|i| shard.contains(i.source_row_id)));
            row_ids.extend(load.items.iter().map(|i| i.source_row_id));
            malformed += load.malformed;
        }
        row_ids.sort_unstable();

        let expected: Vec<i64> = (1..=20).filter(|n| *n != 13).collect();
        assert_eq!(row_ids, expected);
        assert_eq!(malformed, 1);
    }

    #[tokio::test]
    async fn test_tmdb_filter_and_runtimes() {
        let dir = tempfile::tempdir().unwrap();
        let (backlog_path, catalog_path) = seed(dir.path()).await;
        let runtimes = db::load_runtimes(&catalog_path).await.unwrap();

        let repo = BacklogRepository::open(&backlog_path).await.unwrap();
        let load = repo
            .load_shard(ShardSpec::default(), Some(550), &runtimes)
            .await
            .unwrap();

        assert_eq!(load.items.len(), 10);
        let first = &load.items[0];
        assert_eq!(first.tmdb_id, Some(550));
        assert_eq!(first.runtime_minutes, 139);
        assert_eq!(first.size_scraped, 1_610_612_736);
        assert_eq!(first.info_hash.as_str(), format!("{:040X}", first.source_row_id));
    }

    #[tokio::test]
    async fn test_missing_backlog_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = BacklogRepository::open(&dir.path().join("absent.db")).await;
        assert!(result.is_err());
    }
}
