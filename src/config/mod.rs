//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::jobs::{SchedulerConfig, ShardSpec};
use crate::services::SwarmConfig;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Scraped torrent backlog (read-only)
    pub backlog_db_path: PathBuf,

    /// Movie catalog with runtimes (read-only, optional)
    pub catalog_db_path: PathBuf,

    /// Shared enrichment cache
    pub cache_db_path: PathBuf,

    /// Session/state root; each shard keeps its DHT state in its own subdirectory
    pub session_path: PathBuf,

    /// Maximum items in flight per process
    pub concurrency: usize,

    /// Per-item swarm budget
    pub timeout: Duration,

    pub progress_interval: Duration,

    /// File names kept per torrent
    pub max_files: usize,

    /// Enable DHT for peer discovery
    pub torrent_enable_dht: bool,

    /// Listen port for incoming torrent connections (0 = random)
    pub torrent_listen_port: u16,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            backlog_db_path: env::var("BACKLOG_DB_PATH")
                .unwrap_or_else(|_| "./tmdb_data/torrents.db".to_string())
                .into(),

            catalog_db_path: env::var("CATALOG_DB_PATH")
                .unwrap_or_else(|_| "./tmdb_data/tmdb_minimal_no_original.db".to_string())
                .into(),

            cache_db_path: env::var("CACHE_DB_PATH")
                .unwrap_or_else(|_| "./tmdb_data/torrents_data.db".to_string())
                .into(),

            session_path: env::var("SESSION_PATH")
                .unwrap_or_else(|_| "./data/session".to_string())
                .into(),

            concurrency: env::var("ENRICH_CONCURRENCY")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .context("Invalid ENRICH_CONCURRENCY")?,

            timeout: Duration::from_millis(
                env::var("ENRICH_TIMEOUT_MS")
                    .unwrap_or_else(|_| "12000".to_string())
                    .parse()
                    .context("Invalid ENRICH_TIMEOUT_MS")?,
            ),

            progress_interval: Duration::from_millis(
                env::var("ENRICH_PROGRESS_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .context("Invalid ENRICH_PROGRESS_INTERVAL_MS")?,
            ),

            max_files: env::var("ENRICH_MAX_FILES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("Invalid ENRICH_MAX_FILES")?,

            torrent_enable_dht: env::var("TORRENT_ENABLE_DHT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            torrent_listen_port: env::var("TORRENT_LISTEN_PORT")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),

            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("pretty") => LogFormat::Pretty,
                _ => LogFormat::Json,
            },
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.concurrency,
            timeout: self.timeout,
            max_files: self.max_files,
        }
    }

    /// Session directory for one shard process
    pub fn shard_session_dir(&self, shard: ShardSpec) -> PathBuf {
        self.session_path.join(format!("shard-{}", shard.shard_id()))
    }

    pub fn swarm(&self, shard: ShardSpec) -> SwarmConfig {
        SwarmConfig {
            session_dir: self.shard_session_dir(shard),
            enable_dht: self.torrent_enable_dht,
            listen_port: self.torrent_listen_port,
        }
    }
}
