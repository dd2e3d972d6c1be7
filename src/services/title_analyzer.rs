//! Title analyzer: torrent title -> resolution, HDR type, codec, container and audio tags
//!
//! Tags are extracted by an ordered rule table. Each rule pairs a pattern with the
//! category it feeds and a normalizer for the raw match. Rules run in table order and
//! the alternatives inside a pattern are tried left to right, so multi-word studio
//! names must precede their abbreviations (`Red Head Sound` before `RHS`).
//!
//! Anything the vocabulary does not cover (codec, container, odd resolutions) comes
//! from a pluggable [QualityHeuristic].

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::release_heuristics::{QualityHeuristic, SceneNameHeuristic};

/// Separator used when the audio tags are stored as one string
pub const AUDIO_SEPARATOR: &str = " | ";

pub const RESOLUTION_UNKNOWN: &str = "N/A";
pub const HDR_SDR: &str = "SDR";
pub const HDR_HDR: &str = "HDR";
pub const HDR_DOLBY_VISION: &str = "Dolby Vision";
pub const DEFAULT_CONTAINER: &str = "mkv";

/// What a rule's matches contribute to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCategory {
    Resolution,
    AudioChannels,
    Quality,
    AudioTrack,
    Subtitles,
}

/// One entry of the tag vocabulary
pub struct TagRule {
    pub category: TagCategory,
    pub pattern: Regex,
    pub normalize: fn(&str) -> Vec<String>,
}

/// Word separators allowed inside multi-word phrases (scene names use dots)
const SEP: &str = r"[ ._\-]";

static TAG_RULES: Lazy<Vec<TagRule>> = Lazy::new(|| {
    let phrase = |words: &[&str]| words.join(SEP);

    let quality = [
        "HEVC".to_string(),
        r"HDR10\+".into(),
        "HDR10".into(),
        "HDR".into(),
        phrase(&["Dolby", "Vision"]),
        "DV".into(),
        "BDRemux".into(),
        "BluRay".into(),
        "Web-DL".into(),
        "Hybrid".into(),
        "IMAX".into(),
    ]
    .join("|");

    let audio_tracks = [
        phrase(&["Red", "Head", "Sound"]),
        "RHS".into(),
        "Bluebird".into(),
        "HDRezka".into(),
        "Jaskier".into(),
        "TVShows".into(),
        "NewStudio".into(),
        "BaibaKo".into(),
        "AlexFilm".into(),
        "LostFilm".into(),
        phrase(&["Кубик", "в", "кубе"]),
        "Octopus".into(),
        "LineFilm".into(),
        phrase(&["Cold", "Film"]),
        "AlphaProject".into(),
        "TVG".into(),
        phrase(&["Good", "People"]),
        "Пифагор".into(),
        phrase(&["Flarrow", "Films"]),
        "FF".into(),
        "Videofilm".into(),
        "Мосфильм".into(),
        "Невафильм".into(),
        "Дубляж".into(),
        "Dub".into(),
        "MVO".into(),
        "DVO".into(),
        "AVO".into(),
        "Original".into(),
        "ENG".into(),
        "RUS".into(),
        "UKR".into(),
    ]
    .join("|");

    vec![
        TagRule {
            category: TagCategory::Resolution,
            pattern: word_alternation(r"3840x2160|4K|2160p|1920x1080|1080p|1280x720|720p"),
            normalize: normalize_resolution,
        },
        TagRule {
            category: TagCategory::AudioChannels,
            pattern: word_alternation(r"5\.1|7\.1"),
            normalize: keep_match,
        },
        TagRule {
            category: TagCategory::Quality,
            pattern: word_alternation(&quality),
            normalize: normalize_phrase,
        },
        TagRule {
            category: TagCategory::AudioTrack,
            pattern: word_alternation(&audio_tracks),
            normalize: normalize_phrase,
        },
        TagRule {
            category: TagCategory::Subtitles,
            pattern: Regex::new(r"(?i)Sub\s*[:(]\s*[^)]+\)?").unwrap(),
            normalize: normalize_subtitles,
        },
    ]
});

static SUBTITLE_INNER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Sub\s*[:(]\s*([^)]+)\)?").unwrap());
static PHRASE_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ ._]+").unwrap());

fn word_alternation(alternatives: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).unwrap()
}

fn keep_match(raw: &str) -> Vec<String> {
    vec![raw.trim().to_string()]
}

fn normalize_resolution(raw: &str) -> Vec<String> {
    let normalized = match raw.to_lowercase().as_str() {
        "3840x2160" | "4k" | "2160p" => "4K".to_string(),
        "1920x1080" | "1080p" => "1080p".to_string(),
        "1280x720" | "720p" => "720p".to_string(),
        _ => raw.to_string(),
    };
    vec![normalized]
}

/// Collapse scene separators inside multi-word tags to single spaces, keep casing.
/// Dashes are left alone so `Web-DL` survives.
fn normalize_phrase(raw: &str) -> Vec<String> {
    vec![PHRASE_SEPARATOR_RE.replace_all(raw.trim(), " ").into_owned()]
}

fn normalize_subtitles(raw: &str) -> Vec<String> {
    let Some(caps) = SUBTITLE_INNER_RE.captures(raw) else {
        return Vec::new();
    };

    caps[1]
        .split([',', '+'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let lower = s.to_lowercase();
            if lower.contains("rus") {
                "Sub: Rus".to_string()
            } else if lower.contains("eng") {
                "Sub: Eng".to_string()
            } else {
                format!("Sub: {}", s)
            }
        })
        .collect()
}

/// Structured result of analyzing one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleAnalysis {
    pub resolution: String,
    pub hdr_type: String,
    pub codec: Option<String>,
    pub container: String,
    /// Channel layouts, dub studios and subtitle labels in first-seen order
    pub audio_tags: Vec<String>,
    /// Quality markers such as `HEVC`, `BluRay`, `IMAX`
    pub quality_tags: Vec<String>,
}

impl TitleAnalysis {
    /// Audio tags joined for storage in a single column.
    pub fn audio(&self) -> String {
        self.audio_tags.join(AUDIO_SEPARATOR)
    }
}

/// Title analyzer with a pluggable secondary heuristic.
#[derive(Clone)]
pub struct TitleAnalyzer {
    heuristic: Arc<dyn QualityHeuristic>,
}

impl Default for TitleAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(SceneNameHeuristic))
    }
}

impl std::fmt::Debug for TitleAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleAnalyzer").finish_non_exhaustive()
    }
}

impl TitleAnalyzer {
    pub fn new(heuristic: Arc<dyn QualityHeuristic>) -> Self {
        Self { heuristic }
    }

    /// Analyze a title. Never fails; unknown fields fall back to `N/A`, `SDR`, `mkv`.
    pub fn analyze(&self, title: &str) -> TitleAnalysis {
        let fallback = self.heuristic.parse(title);

        let mut seen: HashSet<String> = HashSet::new();
        let mut resolution: Option<String> = None;
        let mut quality_tags = Vec::new();
        let mut audio_tags = Vec::new();

        for rule in TAG_RULES.iter() {
            for m in rule.pattern.find_iter(title) {
                for tag in (rule.normalize)(m.as_str()) {
                    if tag.is_empty() || !seen.insert(tag.to_lowercase()) {
                        continue;
                    }
                    match rule.category {
                        TagCategory::Resolution => {
                            resolution.get_or_insert(tag);
                        }
                        TagCategory::Quality => quality_tags.push(tag),
                        TagCategory::AudioChannels
                        | TagCategory::AudioTrack
                        | TagCategory::Subtitles => audio_tags.push(tag),
                    }
                }
            }
        }

        let resolution = resolution
            .or(fallback.resolution)
            .unwrap_or_else(|| RESOLUTION_UNKNOWN.to_string());

        let is_dolby_vision = quality_tags.iter().any(|t| {
            let lower = t.to_lowercase();
            lower.starts_with("dolby") || lower == "dv"
        });
        let is_hdr = quality_tags.iter().any(|t| t.to_lowercase().starts_with("hdr"));

        let hdr_type = if is_dolby_vision {
            HDR_DOLBY_VISION
        } else if is_hdr || fallback.hdr.is_some() {
            HDR_HDR
        } else {
            HDR_SDR
        };

        if audio_tags.is_empty()
            && let Some(audio) = fallback.audio
        {
            audio_tags.push(audio);
        }

        TitleAnalysis {
            resolution,
            hdr_type: hdr_type.to_string(),
            codec: fallback.codec,
            container: fallback
                .container
                .unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
            audio_tags,
            quality_tags,
        }
    }
}

/// Analyze a title with the default scene-name heuristic.
pub fn analyze_title(title: &str) -> TitleAnalysis {
    static DEFAULT: Lazy<TitleAnalyzer> = Lazy::new(TitleAnalyzer::default);
    DEFAULT.analyze(title)
}
