//! Swarm metadata lookup
//!
//! A [`SwarmClient`] joins the peer swarm of one info hash and returns its
//! metadata (name, size, file list) without downloading any piece data.
//! The scheduler owns timeouts; clients only report success or a typed error.

mod session;

pub use session::{LibrqbitSwarm, SwarmConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::services::torrent_metadata::TorrentFileInfo;
use crate::types::InfoHash;

/// Public announce URLs appended to every magnet link.
pub const TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://tracker.qu.ax:6969/announce",
    "udp://open.demonoid.ch:6969/announce",
    "wss://tracker.openwebtorrent.com/announce",
    "wss://tracker.btorrent.xyz/announce",
    "https://tracker.yemekyedim.com:443/announce",
];

/// Metadata resolved from a swarm
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwarmMetadata {
    pub total_size: u64,
    pub files: Vec<TorrentFileInfo>,
}

#[derive(Debug, Error)]
pub enum SwarmError {
    /// The client refused to start the join (bad magnet, unexpected add mode)
    #[error("swarm client rejected torrent: {0}")]
    Rejected(String),
    /// The join started but failed before metadata arrived
    #[error("swarm join failed: {0}")]
    Join(String),
    /// Metadata arrived but could not be decoded
    #[error("invalid torrent metadata: {0}")]
    Metadata(String),
}

#[async_trait]
pub trait SwarmClient: Send + Sync {
    /// Resolve metadata for `info_hash`. May run indefinitely; callers impose the timeout.
    async fn fetch_metadata(&self, info_hash: &InfoHash) -> Result<SwarmMetadata, SwarmError>;
}

/// Build a magnet link with the lowercase hash and every tracker from [`TRACKERS`].
pub fn build_magnet(info_hash: &InfoHash) -> String {
    let mut magnet = format!("magnet:?xt=urn:btih:{}", info_hash.to_lowercase());
    for tracker in TRACKERS {
        magnet.push_str("&tr=");
        magnet.push_str(&urlencoding::encode(tracker));
    }
    magnet
}
