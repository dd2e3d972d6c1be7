//! Best-effort quality parser for scene-style release names
//!
//! Secondary source for the title analyzer: it fills in codec, container and
//! anything the tag vocabulary did not find. Parses names like:
//! - "Chicago Fire S14E08 1080p WEB h264-ETHEL"
//! - "Corner Gas S06E12 Super Sensitive 1080p AMZN WEB-DL DDP2 0 H 264-QOQ"
//! - "Dune.Part.Two.2024.2160p.UHD.BluRay.x265.10bit.HDR.TrueHD.7.1.Atmos.mkv"

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(2160p|1440p|1080p|1080i|720p|576p|480p|4K|UHD)\b").unwrap());
static DOLBY_VISION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(dolby[ ._-]?vision|dovi|dv)\b").unwrap());
static HDR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(hdr10\+?|hdr10plus|hdr|hlg)\b").unwrap());
static CONTAINER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(mkv|mp4|avi|m4v|m2ts|ts|mov|wmv|webm)$").unwrap());

/// Quality information extracted from a release name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuality {
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub hdr: Option<String>,
    pub audio: Option<String>,
    pub container: Option<String>,
}

/// A pluggable secondary parser consulted by the title analyzer.
pub trait QualityHeuristic: Send + Sync {
    fn parse(&self, title: &str) -> ParsedQuality;
}

/// Default heuristic: keyword rules over the upper-cased release name.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneNameHeuristic;

impl QualityHeuristic for SceneNameHeuristic {
    fn parse(&self, title: &str) -> ParsedQuality {
        parse_quality(title)
    }
}

/// Parse quality information from a release name
pub fn parse_quality(title: &str) -> ParsedQuality {
    let upper = title.to_uppercase();
    let mut quality = ParsedQuality::default();

    if let Some(caps) = RESOLUTION_RE.captures(title) {
        let res = caps[1].to_lowercase();
        quality.resolution = Some(match res.as_str() {
            "4k" | "uhd" | "2160p" => "4K".to_string(),
            "1080i" => "1080p".to_string(),
            other => other.to_string(),
        });
    }

    // Codec
    if upper.contains("X265") || upper.contains("H265") || upper.contains("H.265") || upper.contains("HEVC") {
        quality.codec = Some("HEVC".to_string());
    } else if upper.contains("X264") || upper.contains("H264") || upper.contains("H.264") || upper.contains("AVC") {
        quality.codec = Some("H.264".to_string());
    } else if upper.contains("AV1") {
        quality.codec = Some("AV1".to_string());
    } else if upper.contains("XVID") {
        quality.codec = Some("XviD".to_string());
    }

    if DOLBY_VISION_RE.is_match(title) {
        quality.hdr = Some("Dolby Vision".to_string());
    } else if HDR_RE.is_match(title) {
        quality.hdr = Some("HDR".to_string());
    }

    // Audio
    if upper.contains("ATMOS") {
        quality.audio = Some("Atmos".to_string());
    } else if upper.contains("TRUEHD") {
        quality.audio = Some("TrueHD".to_string());
    } else if upper.contains("DTS-HD") || upper.contains("DTSHD") {
        quality.audio = Some("DTS-HD".to_string());
    } else if upper.contains("DTS") {
        quality.audio = Some("DTS".to_string());
    } else if upper.contains("DDP") || upper.contains("DD+") || upper.contains("EAC3") {
        quality.audio = Some("DD+".to_string());
    } else if upper.contains("AC3") {
        quality.audio = Some("DD".to_string());
    } else if upper.contains("AAC") {
        quality.audio = Some("AAC".to_string());
    }

    if let Some(caps) = CONTAINER_RE.captures(title.trim()) {
        quality.container = Some(caps[1].to_lowercase());
    }

    quality
}
