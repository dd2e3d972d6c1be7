//! Sharded, resumable metadata enrichment for a torrent catalog backlog.
//!
//! Each worker process reads its shard of the backlog, skips hashes already in
//! the cache store, and resolves the rest through the peer swarm with a title
//! analysis fallback.

pub mod cli;
pub mod config;
pub mod db;
pub mod jobs;
pub mod services;
pub mod types;
