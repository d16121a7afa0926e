//! Utility functions shared across the crate.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::PathBuf;

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Get the user's cache directory following XDG conventions.
///
/// Returns `$XDG_CACHE_HOME` if set, otherwise `$HOME/.cache`.
pub fn cache_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
}

/// Get the default on-disk formatter cache path.
pub fn formatter_cache_path() -> PathBuf {
    cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("formatter-cache")
}

/// Clear a formatter cache database on disk.
///
/// Returns the number of entries cleared, or an error message.
pub fn clear_formatter_cache(cache_path: &std::path::Path) -> Result<usize, String> {
    if !cache_path.exists() {
        return Ok(0);
    }

    let db = sled::open(cache_path).map_err(|e| format!("Failed to open cache: {e}"))?;

    let count = db.len();
    db.clear().map_err(|e| format!("Failed to clear cache: {e}"))?;
    db.flush().map_err(|e| format!("Failed to flush cache: {e}"))?;

    Ok(count)
}

/// Drop sub-second precision; HTTP dates only carry whole seconds.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn format_http_date(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Obsolete HTTP-date forms recipients must still accept: RFC 850 and asctime
const OBSOLETE_HTTP_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %d %H:%M:%S %Y"];

/// Parse an `If-Modified-Since` style header value.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // asctime pads single-digit days with a space
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    OBSOLETE_HTTP_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Interpret a loose boolean request parameter (`y`, `yes`, `true`, `on`, `1`).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "true" | "on" | "1"
    )
}
