//! Torrent metadata parsing utilities
//!
//! Extracts the file list from bencoded torrent metadata obtained from a swarm,
//! without downloading any content, and derives the stored file columns from it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Stored in place of a file type when the torrent lists no files
pub const FOLDER_FILE_TYPE: &str = "folder";

/// Information about a file within a torrent
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFileInfo {
    /// Relative path within the torrent
    pub path: PathBuf,
    /// File name (last component of path)
    pub name: String,
    /// File size in bytes
    pub size: u64,
}

impl TorrentFileInfo {
    /// Last dot-separated segment of the name, lowercased.
    /// A name without a dot yields the whole name.
    pub fn extension(&self) -> String {
        self.name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

/// File list and total size of a torrent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TorrentContents {
    pub name: Option<String>,
    pub total_size: u64,
    pub files: Vec<TorrentFileInfo>,
}

/// Parse bencoded `.torrent` bytes (a dictionary with an `info` key)
pub fn parse_torrent_bytes(torrent_bytes: &[u8]) -> Result<TorrentContents> {
    // Minimal bencode structures for extracting file info
    #[derive(Debug, Deserialize)]
    struct TorrentFile {
        length: u64,
        #[serde(default)]
        path: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    struct TorrentInfo {
        name: String,
        #[serde(default)]
        length: Option<u64>,
        #[serde(default)]
        files: Option<Vec<TorrentFile>>,
    }

    #[derive(Debug, Deserialize)]
    struct Torrent {
        info: TorrentInfo,
    }

    let Torrent { info } =
        serde_bencode::from_bytes(torrent_bytes).context("Failed to parse torrent file")?;

    let mut files = Vec::new();

    if let Some(torrent_files) = info.files {
        for file in torrent_files {
            let path: PathBuf = file.path.iter().collect();
            let name = file
                .path
                .last()
                .cloned()
                .unwrap_or_else(|| path.to_string_lossy().to_string());
            files.push(TorrentFileInfo {
                path,
                name,
                size: file.length,
            });
        }
    } else if let Some(length) = info.length {
        files.push(TorrentFileInfo {
            path: PathBuf::from(&info.name),
            name: info.name.clone(),
            size: length,
        });
    }

    Ok(TorrentContents {
        name: Some(info.name),
        total_size: files.iter().map(|f| f.size).sum(),
        files,
    })
}

/// Stored file columns derived from a torrent's contents
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    /// Extension of the largest file, or `folder`
    pub file_type: String,
    /// File names in torrent order, capped
    pub files: Vec<String>,
}

/// Summarize the file list: file type of the largest file and the first `max_files` names
pub fn summarize_files(files: &[TorrentFileInfo], max_files: usize) -> FileSummary {
    let Some(main_file) = files.iter().reduce(|main, f| if main.size > f.size { main } else { f }) else {
        return FileSummary {
            file_type: FOLDER_FILE_TYPE.to_string(),
            files: Vec::new(),
        };
    };

    FileSummary {
        file_type: main_file.extension(),
        files: files.iter().take(max_files).map(|f| f.name.clone()).collect(),
    }
}
