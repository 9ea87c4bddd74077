//! Chat message formatting.
//!
//! Every function here returns text that already fits the chat platform's
//! length cap; lengths are counted in characters, not bytes.

use crate::brief::normalize::{looks_garbled, normalize_whitespace, sanitize_text};
use crate::config::KakaoConfig;
use crate::models::{BriefItem, CandidateLink, ChatMessage, FeedItem};

/// Title shown when neither the title nor the body gives anything readable.
pub const UNKNOWN_TITLE: &str = "제목 미상";
const FALLBACK_TITLE_CHARS: usize = 50;
/// Notices shorter than this are never cut at a newline.
const MIN_SPLIT_AT_NEWLINE: usize = 200;

/// Cut `text` to at most `max` characters, ending in `...` when cut and
/// there is room for it.
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max < 3 {
        return text.chars().take(max).collect();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Split a long notice into chunks of at most `chunk_chars` characters,
/// preferring to cut at the last newline when it is far enough in.
pub fn split_message(text: &str, chunk_chars: usize) -> Vec<String> {
    let chunk_chars = chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while rest.chars().count() > chunk_chars {
        let window = &rest[..byte_offset(rest, chunk_chars + 1)];
        let cut = window
            .rfind('\n')
            .filter(|&i| rest[..i].chars().count() >= MIN_SPLIT_AT_NEWLINE.min(chunk_chars))
            .unwrap_or_else(|| byte_offset(rest, chunk_chars));
        let head = rest[..cut].trim();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        rest = rest[cut..].trim();
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// The title to display for an item: its own title, or when that looks
/// garbled, the start of the first bullet or of the conclusion.
pub fn display_title(item: &BriefItem) -> String {
    if !looks_garbled(&item.title) {
        return normalize_whitespace(&sanitize_text(&item.title));
    }
    item.bullets
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(item.conclusion.as_str()))
        .map(|s| normalize_whitespace(&sanitize_text(s)))
        .find(|s| !s.is_empty())
        .map(|s| s.chars().take(FALLBACK_TITLE_CHARS).collect())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}

/// One validated briefing item as one message, its button pointing at the
/// item's URL.
pub fn item_message(date: &str, category: &str, item: &BriefItem, config: &KakaoConfig) -> ChatMessage {
    let mut lines = vec![
        format!("🗞️ {date} | {category} #{}", item.rank),
        String::new(),
        format!("📌 {}", display_title(item)),
        String::new(),
    ];
    lines.extend(item.bullets.iter().map(|b| format!("- {}", normalize_whitespace(b))));
    if !item.conclusion.is_empty() {
        lines.push(String::new());
        lines.push(format!("한줄결론: {}", normalize_whitespace(&item.conclusion)));
    }
    ChatMessage {
        text: clip(&lines.join("\n"), config.max_chars),
        link: Some(item.url.clone()),
        button_title: config.button_title.clone(),
    }
}

/// A per-article summary message.
pub fn summary_message(
    date: &str,
    label: &str,
    index: usize,
    title: &str,
    summary_lines: &[String],
    url: &str,
    config: &KakaoConfig,
) -> ChatMessage {
    let text = format!(
        "📰 {date} | {label}\n({index}) {}\n\n{}",
        normalize_whitespace(title),
        summary_lines.join("\n")
    );
    ChatMessage {
        text: clip(&text, config.max_chars),
        link: Some(url.to_string()),
        button_title: config.button_title.clone(),
    }
}

/// Sent in place of a summary when the article could not be summarized;
/// the button still opens the article.
pub fn summary_failure_message(date: &str, label: &str, index: usize, title: &str, reason: &str, url: &str, config: &KakaoConfig) -> ChatMessage {
    let text = format!(
        "⚠️ {date} | {label}\n({index}) {}\n요약 실패: {reason}",
        normalize_whitespace(title)
    );
    ChatMessage {
        text: clip(&text, config.max_chars),
        link: Some(url.to_string()),
        button_title: "원문".to_string(),
    }
}

/// The RSS digest: numbered `[source] title` entries with their links.
pub fn feed_digest(date: &str, items: &[FeedItem], config: &KakaoConfig) -> ChatMessage {
    let entries: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, x)| format!("{}) [{}] {}\n{}", i + 1, x.source, normalize_whitespace(&x.title), x.link))
        .collect();
    let text = format!("📈 {date} 경제 뉴스 TOP {}\n\n{}", items.len(), entries.join("\n\n"));
    ChatMessage {
        text: clip(&text, config.max_chars),
        link: Some(config.default_link.clone()),
        button_title: config.button_title.clone(),
    }
}

/// Title-only digest for a section whose briefing could not be validated.
/// Candidate URLs were collected by the scrapers, so they are safe to show.
pub fn title_only_digest(date: &str, category: &str, candidates: &[CandidateLink], limit: usize, config: &KakaoConfig) -> ChatMessage {
    let top: Vec<&CandidateLink> = candidates.iter().take(limit).collect();
    let entries: Vec<String> = top
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}) {}\n{}", i + 1, c.title, c.url))
        .collect();
    let text = format!("🗞️ {date} | {category} (제목만)\n\n{}", entries.join("\n\n"));
    ChatMessage {
        text: clip(&text, config.max_chars),
        link: Some(
            top.first()
                .map(|c| c.url.clone())
                .unwrap_or_else(|| config.default_link.clone()),
        ),
        button_title: config.button_title.clone(),
    }
}

/// `⚠️ {what} 실패: {reason}`
pub fn failure_notice(what: &str, reason: &str) -> String {
    format!("⚠️ {what} 실패: {reason}")
}

/// A free-text notice, split into `(i/n)`-prefixed chunks when long.
pub fn notice_messages(text: &str, config: &KakaoConfig) -> Vec<ChatMessage> {
    let chunks = split_message(text, config.chunk_chars);
    let n = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let text = if n > 1 { format!("({}/{n}) {chunk}", i + 1) } else { chunk };
            ChatMessage {
                text: clip(&text, config.max_chars),
                link: Some(config.default_link.clone()),
                button_title: "확인".to_string(),
            }
        })
        .collect()
}
