//! Whitespace, control-character and URL normalisation.
//!
//! Everything here is total: no function fails, and bad input degrades to an
//! empty string that callers treat as "absent".

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum share of expected characters for a title to count as readable.
pub const GARBLED_THRESHOLD: f64 = 0.7;

static ABSOLUTE_HTTP_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[^\s/?#]+\.[^\s/?#]+(?:[/?#]\S*)?$").expect("static regex")
});

/// Collapse every run of whitespace (non-breaking spaces included) into one
/// space and trim both ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace control characters and U+FFFD with spaces, then collapse
/// whitespace.
pub fn sanitize_text(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if c.is_control() || c == '\u{FFFD}' { ' ' } else { c })
        .collect();
    normalize_whitespace(&replaced)
}

/// Trim, default the scheme to `https://`, and return `""` unless the result
/// is an absolute http(s) URL.
///
/// Idempotent: `normalize_url(&normalize_url(x)) == normalize_url(x)`.
pub fn normalize_url(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    let candidate = if has_http_scheme(s) {
        s.to_string()
    } else {
        format!("https://{s}")
    };
    if ABSOLUTE_HTTP_URL.is_match(&candidate) {
        candidate
    } else {
        String::new()
    }
}

fn has_http_scheme(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `true` when a title looks broken (mojibake, control characters, empty).
///
/// The ratio is computed over the whitespace-collapsed title *before* control
/// characters are stripped, so a title made mostly of control characters is
/// garbled even though it would sanitise down to a few readable letters.
pub fn looks_garbled(title: &str) -> bool {
    looks_garbled_with(title, GARBLED_THRESHOLD)
}

pub fn looks_garbled_with(title: &str, threshold: f64) -> bool {
    let s = normalize_whitespace(title);
    if sanitize_text(&s).is_empty() {
        return true;
    }
    let total = s.chars().count();
    let ok = s.chars().filter(|c| is_expected_title_char(*c)).count();
    (ok as f64) / (total as f64) < threshold
}

fn is_expected_title_char(c: char) -> bool {
    matches!(c, '가'..='힣')
        || c.is_ascii_alphanumeric()
        || c == ' '
        || matches!(
            c,
            '.' | ',' | '-' | '(' | ')' | '[' | ']' | '\'' | '"' | '“' | '”' | '‘' | '’' | ':' | '%'
        )
}
