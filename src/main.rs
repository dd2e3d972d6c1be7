use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use torrent_enricher::cli::CliOptions;
use torrent_enricher::config::{Config, LogFormat};
use torrent_enricher::db::{self, BacklogRepository, SqliteDetailsStore};
use torrent_enricher::jobs::{self, FetchMode, RunOptions, Scheduler, ShardSpec};
use torrent_enricher::services::LibrqbitSwarm;

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "torrent_enricher=info,librqbit=warn".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let cli = CliOptions::from_args();
    let shard = ShardSpec::new(cli.shard_id, cli.total_shards).context("Invalid shard")?;

    info!(
        shard = %shard,
        title_only = cli.title_only,
        force = cli.force,
        tmdb_id = ?cli.tmdb_id,
        "Starting torrent enricher"
    );

    let done = db::load_done_hashes(&config.cache_db_path)
        .await
        .with_context(|| format!("Failed to read cache store {}", config.cache_db_path.display()))?;
    info!(count = done.len(), "Loaded completed hashes");

    let runtimes = db::load_runtimes(&config.catalog_db_path).await.unwrap_or_else(|e| {
        warn!(error = %e, "Movie catalog unreadable, bitrate will be unknown");
        Default::default()
    });

    let backlog_repo = BacklogRepository::open(&config.backlog_db_path).await?;
    let backlog = backlog_repo.load_shard(shard, cli.tmdb_id, &runtimes).await?;
    backlog_repo.close().await;
    drop(runtimes);

    let store = Arc::new(
        SqliteDetailsStore::open(&config.cache_db_path)
            .await
            .with_context(|| format!("Failed to open cache store {}", config.cache_db_path.display()))?,
    );

    let mode = if cli.title_only {
        FetchMode::TitleOnly
    } else {
        FetchMode::Swarm(Arc::new(LibrqbitSwarm::new(&config.swarm(shard)).await?))
    };

    let scheduler = Arc::new(Scheduler::new(mode, store.clone(), config.scheduler()));
    let options = RunOptions {
        force: cli.force,
        progress_interval: config.progress_interval,
    };

    let summary = jobs::run_enrichment(scheduler, backlog, &done, &options).await;
    store.close().await;

    info!(
        shard = %shard,
        processed = summary.processed,
        success = summary.success,
        timeout = summary.timeout,
        error = summary.error,
        error_add = summary.error_add,
        title_only = summary.title_only,
        skipped = summary.skipped,
        malformed = summary.malformed,
        persist_failed = summary.persist_failed,
        elapsed_secs = summary.elapsed_secs,
        "Shard complete"
    );

    Ok(())
}
