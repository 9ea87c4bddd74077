//! Data models shared by the scrapers, the brief parser and the senders.
//!
//! - [`CandidateLink`]: a `{title, url}` pair discovered by a scraper
//! - [`CandidateSet`]: a named, URL-unique batch of candidates for one section
//! - [`BriefItem`]: one article parsed out of the generated briefing text
//! - [`FeedItem`]: one RSS entry, carrying the key used for sent-state dedupe
//! - [`ChatMessage`]: a formatted message ready for a chat sender
//! - [`BriefArchive`]: the validated briefing of one run, as archived to JSON

use crate::brief::normalize::normalize_whitespace;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A candidate article link offered to the generator as ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CandidateLink {
    pub title: String,
    pub url: String,
}

impl CandidateLink {
    /// Build a candidate with a whitespace-collapsed title. Returns `None` when
    /// either side ends up empty.
    pub fn new(title: &str, url: &str) -> Option<Self> {
        let title = normalize_whitespace(title);
        let url = url.trim().to_string();
        if title.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self { title, url })
    }
}

/// A candidate tagged with its short prompt identifier (`KR-01`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedCandidate {
    pub id: String,
    pub link: CandidateLink,
}

/// The candidates of one section for one run.
///
/// Construction drops empty entries and duplicate URLs (first wins), so the
/// set always satisfies the collectors' input contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSet {
    pub name: String,
    pub id_prefix: String,
    pub candidates: Vec<TaggedCandidate>,
}

impl CandidateSet {
    pub fn new(name: &str, id_prefix: &str, links: Vec<CandidateLink>) -> Self {
        let candidates = links
            .into_iter()
            .filter(|l| !l.title.is_empty() && !l.url.is_empty())
            .unique_by(|l| l.url.clone())
            .enumerate()
            .map(|(i, link)| TaggedCandidate {
                id: format!("{}-{:02}", id_prefix, i + 1),
                link,
            })
            .collect();
        Self {
            name: name.to_string(),
            id_prefix: id_prefix.to_string(),
            candidates,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn links(&self) -> impl Iterator<Item = &CandidateLink> {
        self.candidates.iter().map(|c| &c.link)
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.link.url.as_str())
    }
}

/// One article parsed out of the generated briefing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BriefItem {
    /// Heading number as written by the generator. Only used for ordering.
    pub rank: u32,
    /// Short candidate identifier when the heading carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub bullets: Vec<String>,
    /// One-line remark; empty when absent.
    pub conclusion: String,
    /// Article link; empty when the URL line was missing or malformed.
    pub url: String,
}

/// One entry read from an RSS feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub source: String,
    pub title: String,
    pub link: String,
    pub guid: Option<String>,
    /// Publication date as given by the feed, normalised to RFC 3339 when it
    /// could be parsed.
    pub date: Option<String>,
}

impl FeedItem {
    /// Sent-state key: the feed's unique identifier, then the link, then the
    /// title. `None` when the entry carries none of them.
    pub fn dedupe_key(&self) -> Option<String> {
        [self.guid.as_deref(), Some(self.link.as_str()), Some(self.title.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|k| !k.is_empty())
            .map(str::to_string)
    }
}

/// A formatted chat message with an optional single link button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub link: Option<String>,
    pub button_title: String,
}

/// The validated briefing of one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BriefArchive {
    /// KST date, `YYYY-MM-DD`.
    pub date: String,
    /// RFC 3339 timestamp of the run.
    pub generated_at: String,
    /// A section marker was missing in the accepted attempt.
    pub degraded: bool,
    pub domestic: Vec<BriefItem>,
    pub world: Vec<BriefItem>,
    /// Sections sent as a title-only digest instead of briefing items.
    #[serde(default)]
    pub fallback_sections: Vec<String>,
}
