//! Splits a section into numbered item blocks and extracts each field.
//!
//! Each line pattern lives behind its own function so that a change in the
//! generator's output format shows up as one failing test.

use super::BriefFormat;
use super::normalize::normalize_url;
use crate::models::BriefItem;

/// The parsed first line of an item block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub rank: u32,
    pub id: Option<String>,
    pub title: String,
}

/// `### 3. Title` or `### 3. ID: KR-01 | Title`.
pub fn parse_heading(line: &str, format: &BriefFormat) -> Option<Heading> {
    let caps = format.heading.captures(line.trim())?;
    let rank = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let id = caps.get(2).map(|m| m.as_str().trim().to_string());
    let title = caps.get(3)?.as_str().trim().to_string();
    Some(Heading { rank, id, title })
}

/// `- text`: returns the text with leading dashes and whitespace removed.
pub fn parse_bullet(line: &str) -> Option<String> {
    let line = line.trim();
    let rest = line.strip_prefix('-')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let text = line.trim_start_matches('-').trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// `한줄결론: text` (label from configuration, case-insensitive).
pub fn parse_conclusion(line: &str, format: &BriefFormat) -> Option<String> {
    let caps = format.conclusion.captures(line.trim())?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

/// `URL: https://...` (label case-insensitive). The value goes through
/// [`normalize_url`], so a malformed URL comes back as `Some("")`.
pub fn parse_url_line(line: &str, format: &BriefFormat) -> Option<String> {
    let caps = format.url_line.captures(line.trim())?;
    Some(normalize_url(caps.get(1)?.as_str()))
}

/// Group the non-empty, trimmed lines of a section into blocks, each starting
/// at a heading line. Lines before the first heading form their own block.
fn split_blocks<'a>(section: &'a str, format: &BriefFormat) -> Vec<Vec<&'a str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in section.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if format.block_start.is_match(line) || blocks.is_empty() {
            blocks.push(Vec::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }
    blocks
}

fn parse_block(lines: &[&str], format: &BriefFormat) -> Option<BriefItem> {
    let heading = parse_heading(lines.first()?, format)?;
    let body = &lines[1..];

    let bullets = body
        .iter()
        .filter_map(|l| parse_bullet(l))
        .take(format.max_bullets)
        .collect();
    let conclusion = body
        .iter()
        .find_map(|l| parse_conclusion(l, format))
        .unwrap_or_default();
    let url = body
        .iter()
        .find_map(|l| parse_url_line(l, format))
        .unwrap_or_default();

    Some(BriefItem {
        rank: heading.rank,
        id: heading.id,
        title: heading.title,
        bullets,
        conclusion,
        url,
    })
}

/// Parse every item of a section, keeping items whose URL is empty.
///
/// Blocks without a heading are skipped, as are items with an empty title.
/// The result is stably sorted by rank; ranks may repeat or have gaps.
pub fn parse_items_raw(section: &str, format: &BriefFormat) -> Vec<BriefItem> {
    let mut items: Vec<BriefItem> = split_blocks(section, format)
        .iter()
        .filter_map(|block| parse_block(block, format))
        .filter(|item| !item.title.is_empty())
        .collect();
    items.sort_by_key(|item| item.rank);
    items
}

/// [`parse_items_raw`] without the items that lack a URL.
#[cfg_attr(not(test), allow(dead_code))]
pub fn parse_items(section: &str, format: &BriefFormat) -> Vec<BriefItem> {
    parse_items_raw(section, format)
        .into_iter()
        .filter(|item| !item.url.is_empty())
        .collect()
}
