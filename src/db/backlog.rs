//! Backlog and movie catalog readers
//!
//! Both stores are opened read-only. The backlog's `rowid` is the sharding key,
//! and the shard predicate is pushed into SQL so a worker only reads its slice.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::jobs::shard::{ShardSpec, partition};
use crate::services::bitrate::parse_size_to_bytes;
use crate::types::{BacklogRow, InfoHash, WorkItem};

async fn open_read_only(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Validated rows of one shard
#[derive(Debug, Default)]
pub struct BacklogLoad {
    pub items: Vec<WorkItem>,
    /// Rows skipped because no info hash could be extracted
    pub malformed: usize,
}

/// Reader over the scraped torrent backlog (`torrents` table)
pub struct BacklogRepository {
    pool: SqlitePool,
}

impl BacklogRepository {
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            pool: open_read_only(path).await?,
        })
    }

    /// Raw rows of one shard, optionally restricted to a single catalog id
    pub async fn fetch_rows(&self, shard: ShardSpec, tmdb_id: Option<i64>) -> Result<Vec<BacklogRow>> {
        let mut sql = String::from(
            r#"
            SELECT rowid, magnet, torrent_title, CAST(size AS TEXT), CAST(tmdb_id AS INTEGER)
            FROM torrents
            WHERE rowid % ? = ?
            "#,
        );
        if tmdb_id.is_some() {
            sql.push_str(" AND CAST(tmdb_id AS INTEGER) = ?");
        }
        sql.push_str(" ORDER BY rowid");

        let mut query = sqlx::query_as::<_, (i64, Option<String>, Option<String>, Option<String>, Option<i64>)>(&sql)
            .bind(i64::from(shard.total_shards()))
            .bind(i64::from(shard.shard_id()));
        if let Some(id) = tmdb_id {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to read backlog")?;

        Ok(rows
            .into_iter()
            .map(|(row_id, magnet, title, size_text, tmdb_id)| BacklogRow {
                row_id,
                magnet_or_hash: magnet.unwrap_or_default(),
                title: title.unwrap_or_default(),
                size_text,
                tmdb_id,
            })
            .collect())
    }

    /// Load and validate this process's slice of the backlog
    pub async fn load_shard(
        &self,
        shard: ShardSpec,
        tmdb_id: Option<i64>,
        runtimes: &HashMap<i64, u32>,
    ) -> Result<BacklogLoad> {
        let rows = self.fetch_rows(shard, tmdb_id).await?;
        let mut load = into_work_items(rows, runtimes);
        load.items = partition(load.items, &shard);

        info!(
            shard = %shard,
            items = load.items.len(),
            malformed = load.malformed,
            "Backlog shard loaded"
        );
        Ok(load)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Validate raw rows, attaching runtimes by catalog id
pub fn into_work_items(rows: Vec<BacklogRow>, runtimes: &HashMap<i64, u32>) -> BacklogLoad {
    let mut load = BacklogLoad::default();

    for row in rows {
        let Some(info_hash) = InfoHash::parse(&row.magnet_or_hash) else {
            debug!(row_id = row.row_id, title = %row.title, "Skipping row without a valid info hash");
            load.malformed += 1;
            continue;
        };

        let runtime_minutes = row
            .tmdb_id
            .and_then(|id| runtimes.get(&id).copied())
            .unwrap_or(0);

        load.items.push(WorkItem {
            info_hash,
            size_scraped: row.size_text.as_deref().map(parse_size_to_bytes).unwrap_or(0),
            title: row.title,
            runtime_minutes,
            source_row_id: row.row_id,
            tmdb_id: row.tmdb_id,
        });
    }

    load
}

/// Runtime in minutes per catalog id (`items_minimal` table).
///
/// A missing catalog is not fatal: every runtime is then unknown.
pub async fn load_runtimes(path: &Path) -> Result<HashMap<i64, u32>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!(path = %path.display(), "Movie catalog not found, bitrate will be unknown");
        return Ok(HashMap::new());
    }

    let pool = open_read_only(path).await?;
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT id, CAST(runtime AS INTEGER)
        FROM items_minimal
        WHERE runtime IS NOT NULL AND CAST(runtime AS INTEGER) > 0
        "#,
    )
    .fetch_all(&pool)
    .await
    .context("Failed to read movie runtimes")?;
    pool.close().await;

    let runtimes: HashMap<i64, u32> = rows
        .into_iter()
        .filter_map(|(id, runtime)| u32::try_from(runtime).ok().map(|r| (id, r)))
        .collect();

    info!(count = runtimes.len(), "Movie runtimes loaded");
    Ok(runtimes)
}
