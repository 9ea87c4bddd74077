//! Splits one generated briefing into its domestic and world sections.

use tracing::warn;

/// The two sections of a briefing.
///
/// `degraded` is set when a marker was missing; callers keep going with
/// whatever was extracted and flag the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub a: String,
    pub b: String,
    pub degraded: bool,
}

/// Locate the first `marker_a` and the first `marker_b` after it.
///
/// - both found: `a` is the text between them, `b` the text after `marker_b`
/// - only `marker_a`: `a` is the text after it, `b` is empty, degraded
/// - no `marker_a`: `a` is the whole text, `b` is empty, degraded
pub fn split_sections(text: &str, marker_a: &str, marker_b: &str) -> Sections {
    let Some(a_at) = find_marker(text, marker_a, 0) else {
        warn!(marker = marker_a, "First section marker missing; briefing format degraded");
        return Sections {
            a: text.trim().to_string(),
            b: String::new(),
            degraded: true,
        };
    };
    let a_start = a_at + marker_a.len();

    match find_marker(text, marker_b, a_start) {
        Some(b_at) => Sections {
            a: text[a_start..b_at].trim().to_string(),
            b: text[b_at + marker_b.len()..].trim().to_string(),
            degraded: false,
        },
        None => {
            warn!(marker = marker_b, "Second section marker missing; briefing format degraded");
            Sections {
                a: text[a_start..].trim().to_string(),
                b: String::new(),
                degraded: true,
            }
        }
    }
}

fn find_marker(text: &str, marker: &str, from: usize) -> Option<usize> {
    if marker.is_empty() {
        return None;
    }
    text[from..].find(marker).map(|i| from + i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_both_markers() {
        let text = "intro\n==DOM==\n### 1. A\n==WORLD==\n### 1. C\n";
        let s = split_sections(text, "==DOM==", "==WORLD==");
        assert_eq!(s.a, "### 1. A");
        assert_eq!(s.b, "### 1. C");
        assert!(!s.degraded);
    }

    #[test]
    fn test_split_only_first_marker() {
        let text = "==DOM==\n### 1. A\nURL: https://site.a/1\n";
        let s = split_sections(text, "==DOM==", "==WORLD==");
        assert_eq!(s.a, "### 1. A\nURL: https://site.a/1");
        assert_eq!(s.b, "");
        assert!(s.degraded);
    }

    #[test]
    fn test_split_missing_first_marker() {
        let text = "  ### 1. A\n==WORLD==\n### 1. C  ";
        let s = split_sections(text, "==DOM==", "==WORLD==");
        assert_eq!(s.a, "### 1. A\n==WORLD==\n### 1. C");
        assert_eq!(s.b, "");
        assert!(s.degraded);
    }

    #[test]
    fn test_second_marker_before_first_is_ignored() {
        let text = "==WORLD== stray\n==DOM==\n### 1. A\n";
        let s = split_sections(text, "==DOM==", "==WORLD==");
        assert_eq!(s.a, "### 1. A");
        assert!(s.degraded);
    }

    #[test]
    fn test_marker_suffix_stays_in_section() {
        let text = "==한국 주요뉴스 TOP5==\n### 1. 가\n==세계 경제 주요뉴스 TOP5==\n### 1. 나";
        let s = split_sections(text, "==한국 주요뉴스", "==세계 경제 주요뉴스");
        assert_eq!(s.a, "TOP5==\n### 1. 가");
        assert_eq!(s.b, "TOP5==\n### 1. 나");
        assert!(!s.degraded);
    }
}
