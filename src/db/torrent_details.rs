//! Cache store for enrichment results
//!
//! One row per info hash in `torrent_details`. The store is shared by every
//! shard process, so it runs in WAL mode with a busy timeout and each upsert
//! is a single short transaction.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, SqlitePool};
use thiserror::Error;
use tracing::debug;

use crate::db::sqlite_helpers::{i64_to_u64, json_to_vec_opt, u64_to_i64, vec_to_json};
use crate::types::{InfoHash, TorrentDetails};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS torrent_details (
    info_hash TEXT PRIMARY KEY,
    resolution TEXT,
    size INTEGER,
    files TEXT,
    hdr_type TEXT,
    file_type TEXT,
    codec TEXT,
    bitrate REAL,
    audio TEXT
)
"#;

/// Removes the lowercase legacy spelling of a hash. Exact match keeps it on the primary key index.
const DELETE_LEGACY: &str = "DELETE FROM torrent_details WHERE info_hash = ?";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for enrichment results
#[async_trait]
pub trait DetailsStore: Send + Sync {
    /// Insert or replace the row for `details.info_hash`, replacing a lowercase legacy row too.
    async fn upsert(&self, details: &TorrentDetails) -> Result<(), StoreError>;
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.message().contains("no such table"))
}

/// Read every persisted info hash in one pass.
///
/// Opens the store read-only. A missing file or a missing table is an empty set.
pub async fn load_done_hashes(path: &Path) -> Result<HashSet<InfoHash>, StoreError> {
    if !tokio::fs::try_exists(path).await? {
        debug!(path = %path.display(), "Cache store does not exist yet");
        return Ok(HashSet::new());
    }

    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .busy_timeout(BUSY_TIMEOUT)
        .connect()
        .await?;

    let rows: Result<Vec<(String,)>, sqlx::Error> =
        sqlx::query_as("SELECT info_hash FROM torrent_details")
            .fetch_all(&mut conn)
            .await;
    conn.close().await?;

    match rows {
        Ok(rows) => Ok(rows
            .into_iter()
            .filter_map(|(hash,)| InfoHash::parse(&hash))
            .collect()),
        Err(e) if is_missing_table(&e) => {
            debug!(path = %path.display(), "Cache table does not exist yet");
            Ok(HashSet::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Repository for the `torrent_details` table
pub struct SqliteDetailsStore {
    pool: SqlitePool,
}

impl SqliteDetailsStore {
    /// Open (creating if needed) the cache store and its table
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch the row for a hash, in canonical or legacy lowercase form
    pub async fn get(&self, info_hash: &InfoHash) -> Result<Option<TorrentDetails>, StoreError> {
        let record: Option<TorrentDetailsRecord> = sqlx::query_as(
            r#"
            SELECT info_hash, resolution, size, files, hdr_type, file_type, codec, bitrate, audio
            FROM torrent_details
            WHERE info_hash IN (?, ?)
            LIMIT 1
            "#,
        )
        .bind(info_hash.as_str())
        .bind(info_hash.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.and_then(TorrentDetailsRecord::into_details))
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM torrent_details")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DetailsStore for SqliteDetailsStore {
    async fn upsert(&self, details: &TorrentDetails) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Legacy rows carry a lowercase hash
        sqlx::query(DELETE_LEGACY)
            .bind(details.info_hash.to_lowercase())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO torrent_details (
                info_hash, resolution, size, files, hdr_type, file_type, codec, bitrate, audio
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(details.info_hash.as_str())
        .bind(&details.resolution)
        .bind(u64_to_i64(details.size))
        .bind(vec_to_json(&details.files))
        .bind(&details.hdr_type)
        .bind(&details.file_type)
        .bind(&details.codec)
        .bind(details.bitrate)
        .bind(&details.audio)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Raw `torrent_details` row
#[derive(Debug, sqlx::FromRow)]
struct TorrentDetailsRecord {
    info_hash: String,
    resolution: Option<String>,
    size: Option<i64>,
    files: Option<String>,
    hdr_type: Option<String>,
    file_type: Option<String>,
    codec: Option<String>,
    bitrate: Option<f64>,
    audio: Option<String>,
}

impl TorrentDetailsRecord {
    fn into_details(self) -> Option<TorrentDetails> {
        Some(TorrentDetails {
            info_hash: InfoHash::parse(&self.info_hash)?,
            resolution: self.resolution.unwrap_or_default(),
            size: i64_to_u64(self.size),
            files: json_to_vec_opt(self.files.as_deref()),
            hdr_type: self.hdr_type.unwrap_or_default(),
            file_type: self.file_type.unwrap_or_default(),
            codec: self.codec,
            bitrate: self.bitrate,
            audio: self.audio.unwrap_or_default(),
        })
    }
}
