//! librqbit-backed swarm client.
//!
//! Torrents are added in list-only mode: the session resolves the info
//! dictionary from peers and returns it without creating any files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use librqbit::dht::PersistentDhtConfig;
use librqbit::{AddTorrent, AddTorrentOptions, AddTorrentResponse, Session, SessionOptions};
use tracing::{debug, info, warn};

use super::{SwarmClient, SwarmError, SwarmMetadata, build_magnet};
use crate::services::torrent_metadata::parse_torrent_bytes;
use crate::types::InfoHash;

/// Session settings for the swarm client
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    pub session_dir: PathBuf,
    pub enable_dht: bool,
    pub listen_port: u16,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("./data/session"),
            enable_dht: true,
            listen_port: 0,
        }
    }
}

fn list_only_opts() -> AddTorrentOptions {
    AddTorrentOptions {
        list_only: true,
        overwrite: true,
        ..Default::default()
    }
}

/// Swarm client over a shared librqbit session
pub struct LibrqbitSwarm {
    session: Arc<Session>,
}

impl LibrqbitSwarm {
    pub async fn new(config: &SwarmConfig) -> Result<Self> {
        let session_dir_ok = tokio::fs::create_dir_all(&config.session_dir).await.is_ok();
        let session_dir = if session_dir_ok {
            config.session_dir.clone()
        } else {
            let mut temp = std::env::temp_dir().join("torrent-enricher-session");
            if let Some(shard_dir) = config.session_dir.file_name() {
                temp.push(shard_dir);
            }
            warn!(path = %temp.display(), "Using temp directory for session");
            let _ = tokio::fs::create_dir_all(&temp).await;
            temp
        };

        let dht_config = if config.enable_dht {
            Some(PersistentDhtConfig {
                config_filename: Some(session_dir.join("dht.json")),
                ..Default::default()
            })
        } else {
            None
        };

        let session_opts = SessionOptions {
            disable_dht: !config.enable_dht,
            disable_dht_persistence: !config.enable_dht,
            dht_config,
            persistence: None,
            listen_port_range: if config.listen_port > 0 {
                Some(config.listen_port..config.listen_port + 1)
            } else {
                None
            },
            ..Default::default()
        };

        let session = Session::new_with_opts(session_dir.clone(), session_opts)
            .await
            .context("Failed to create torrent session")?;

        info!(
            path = %session_dir.display(),
            dht = config.enable_dht,
            "Swarm session started"
        );

        Ok(Self { session })
    }
}

#[async_trait]
impl SwarmClient for LibrqbitSwarm {
    async fn fetch_metadata(&self, info_hash: &InfoHash) -> Result<SwarmMetadata, SwarmError> {
        let magnet = build_magnet(info_hash);

        let response = self
            .session
            .add_torrent(AddTorrent::from_url(magnet), Some(list_only_opts()))
            .await
            .map_err(|e| SwarmError::Join(format!("{e:#}")))?;

        // The session refusing list-only mode is the rejection path
        let list_only = match response {
            AddTorrentResponse::ListOnly(list_only) => list_only,
            AddTorrentResponse::Added(..) | AddTorrentResponse::AlreadyManaged(..) => {
                return Err(SwarmError::Rejected(
                    "torrent was added for download instead of list-only".to_string(),
                ));
            }
        };

        let contents = parse_torrent_bytes(&list_only.torrent_bytes)
            .map_err(|e| SwarmError::Metadata(format!("{e:#}")))?;

        debug!(
            info_hash = %info_hash,
            name = ?contents.name,
            files = contents.files.len(),
            size = contents.total_size,
            "Resolved swarm metadata"
        );

        Ok(SwarmMetadata {
            total_size: contents.total_size,
            files: contents.files,
        })
    }
}
