//! Title analysis, size and bitrate math, and swarm metadata lookup

pub mod bitrate;
pub mod release_heuristics;
pub mod swarm;
pub mod title_analyzer;
pub mod torrent_metadata;

pub use bitrate::{bitrate, parse_size_to_bytes};
pub use release_heuristics::{ParsedQuality, QualityHeuristic, SceneNameHeuristic};
pub use swarm::{LibrqbitSwarm, SwarmClient, SwarmConfig, SwarmError, SwarmMetadata};
pub use title_analyzer::{TitleAnalysis, TitleAnalyzer, analyze_title};
