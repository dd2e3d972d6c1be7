//! Bitrate estimation and scraped-size parsing

use once_cell::sync::Lazy;
use regex::Regex;

static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(TB|GB|MB|KB|ТБ|ГБ|МБ|КБ)").unwrap()
});

/// Average bitrate in Mbps, rounded to two decimals.
///
/// Returns `None` when either the size or the runtime is missing or not positive.
pub fn bitrate(size_bytes: Option<u64>, runtime_minutes: Option<u32>) -> Option<f64> {
    let size_bytes = size_bytes.filter(|s| *s > 0)?;
    let runtime_minutes = runtime_minutes.filter(|r| *r > 0)?;

    let bits = size_bytes as f64 * 8.0;
    let seconds = runtime_minutes as f64 * 60.0;
    let mbps = bits / seconds / 1_000_000.0;
    Some((mbps * 100.0).round() / 100.0)
}

/// Parse a scraped size such as `"14.5 GB"` or `"700 МБ"` into bytes (binary units).
///
/// A bare integer is taken as a byte count. Unparseable input yields 0.
pub fn parse_size_to_bytes(size: &str) -> u64 {
    let size = size.trim();
    if let Ok(bytes) = size.parse::<u64>() {
        return bytes;
    }

    let Some(caps) = SIZE_RE.captures(size) else {
        return 0;
    };
    let Ok(value) = caps[1].replace(',', ".").parse::<f64>() else {
        return 0;
    };

    let multiplier: f64 = match caps[2].to_uppercase().as_str() {
        "TB" | "ТБ" => 1024f64.powi(4),
        "GB" | "ГБ" => 1024f64.powi(3),
        "MB" | "МБ" => 1024f64.powi(2),
        _ => 1024.0,
    };
    (value * multiplier) as u64
}
