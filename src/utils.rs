//! Utility functions for Korean-time dates, log truncation, and file system
//! operations.
//!
//! - Dates are always computed in KST (UTC+9), whatever the host timezone
//! - String truncation for logging long payloads
//! - File system validation for output directories

use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Current time in Korea Standard Time.
pub fn now_kst() -> DateTime<FixedOffset> {
    let kst = FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&kst)
}

/// `2025-01-07`
pub fn today_kst() -> String {
    now_kst().format("%Y-%m-%d").to_string()
}

/// `20250107`, the form ranking pages take as a query parameter.
pub fn today_compact_kst() -> String {
    now_kst().format("%Y%m%d").to_string()
}

/// `2025-01-07 09:30 KST`
pub fn now_kst_string() -> String {
    now_kst().format("%Y-%m-%d %H:%M KST").to_string()
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes, on a character
/// boundary, with an ellipsis and the count of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
