//! Core domain types shared by the backlog reader, the scheduler and the cache store.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Magnet URIs carry the hash after `btih:`; anything else is treated as a bare hash.
static BTIH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)btih:([a-z0-9]+)").unwrap());

/// A 40-character hexadecimal BitTorrent v1 info hash in canonical (uppercase) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfoHash(String);

impl InfoHash {
    /// Parse a bare hash or a magnet URI. Returns `None` when no 40-hex hash is present.
    pub fn parse(magnet_or_hash: &str) -> Option<Self> {
        let trimmed = magnet_or_hash.trim();
        let candidate = match BTIH_RE.captures(trimmed) {
            Some(caps) => caps.get(1).map(|m| m.as_str())?,
            None => trimmed,
        };

        if candidate.len() == 40 && candidate.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(candidate.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form, as expected by most BitTorrent clients in magnet links.
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw row as read from the backlog store, before validation.
#[derive(Debug, Clone)]
pub struct BacklogRow {
    pub row_id: i64,
    pub magnet_or_hash: String,
    pub title: String,
    pub size_text: Option<String>,
    pub tmdb_id: Option<i64>,
}

/// One torrent to enrich. Built once from the backlog and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub info_hash: InfoHash,
    pub title: String,
    /// Scraped size in bytes, 0 when unknown
    pub size_scraped: u64,
    /// Movie runtime in minutes, 0 when unknown
    pub runtime_minutes: u32,
    pub source_row_id: i64,
    pub tmdb_id: Option<i64>,
}

/// Persisted enrichment result, one row per info hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentDetails {
    pub info_hash: InfoHash,
    pub resolution: String,
    pub size: u64,
    pub files: Vec<String>,
    pub hdr_type: String,
    pub file_type: String,
    pub codec: Option<String>,
    pub bitrate: Option<f64>,
    pub audio: String,
}

/// Terminal state of a single item's swarm attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Swarm returned metadata before the timeout
    Success,
    /// Timeout fired first
    Timeout,
    /// The swarm join failed after it was started
    Error,
    /// The swarm client refused to start the join
    ErrorAdd,
    /// Swarm lookup disabled for this run
    TitleOnly,
}

impl FetchOutcome {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, FetchOutcome::Success)
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Success => write!(f, "SUCCESS"),
            FetchOutcome::Timeout => write!(f, "TIMEOUT"),
            FetchOutcome::Error => write!(f, "ERROR"),
            FetchOutcome::ErrorAdd => write!(f, "ERROR_ADD"),
            FetchOutcome::TitleOnly => write!(f, "TITLE_ONLY"),
        }
    }
}

/// Result of processing one item.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub details: TorrentDetails,
    pub outcome: FetchOutcome,
    pub persisted: bool,
}
