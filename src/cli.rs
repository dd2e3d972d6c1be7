//! Minimal CLI parsing: shard selection and run mode.
//!
//! `torrent-enricher [SHARD_ID] [TOTAL_SHARDS] [--title-only] [--force] [--tmdb-id ID]`

use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub shard_id: u32,
    pub total_shards: u32,
    /// Skip the swarm and persist title analysis only
    pub title_only: bool,
    /// Reprocess items already in the cache
    pub force: bool,
    /// Restrict the run to one catalog id
    pub tmdb_id: Option<i64>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            shard_id: 0,
            total_shards: 1,
            title_only: false,
            force: false,
            tmdb_id: None,
        }
    }
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    /// Unparsable positionals keep their defaults.
    pub fn parse<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = CliOptions::default();
        let mut positional = 0;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--title-only" => options.title_only = true,
                "--force" => options.force = true,
                "--tmdb-id" => {
                    if let Some(value) = args.next() {
                        options.tmdb_id = value.parse().ok();
                    }
                }
                _ if arg.starts_with("--tmdb-id=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.tmdb_id = value.parse().ok();
                    }
                }
                _ if arg.starts_with("--") => {}
                _ => {
                    match positional {
                        0 => options.shard_id = arg.parse().unwrap_or(0),
                        1 => options.total_shards = arg.parse().unwrap_or(1),
                        _ => {}
                    }
                    positional += 1;
                }
            }
        }
        options
    }
}
