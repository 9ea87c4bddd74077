//! Provenance validation of parsed brief items.
//!
//! A generator that is handed a list of article links will sometimes cite a
//! link that was never on the list. Only URLs collected by this process are
//! trusted: every item whose final URL is not an exact member of the
//! allow-set is dropped. Before that check, items with an empty or
//! placeholder URL get one chance to be repaired from the candidate they
//! name (by ID, then by title).

use super::BriefFormat;
use super::normalize::normalize_whitespace;
use crate::models::{BriefItem, CandidateSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

/// How placeholder URLs (a bare site root instead of an article) are
/// recognised.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderRule {
    /// Only the configured literal URLs.
    Listed,
    /// The configured literal URLs, plus any http(s) URL with no path beyond
    /// `/`, no query and no fragment.
    RootPath,
}

/// `true` when `url` is a placeholder under `rule`.
pub fn is_placeholder_url(url: &str, rule: &PlaceholderRule, listed: &[String]) -> bool {
    let trimmed = url.trim().trim_end_matches('/');
    if listed
        .iter()
        .any(|l| l.trim().trim_end_matches('/').eq_ignore_ascii_case(trimmed))
    {
        return true;
    }
    match rule {
        PlaceholderRule::Listed => false,
        PlaceholderRule::RootPath => Url::parse(url.trim())
            .map(|u| {
                matches!(u.scheme(), "http" | "https")
                    && u.path() == "/"
                    && u.query().is_none()
                    && u.fragment().is_none()
            })
            .unwrap_or(false),
    }
}

/// Result of validating one section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Items that passed, in input order, truncated to the requested maximum.
    pub items: Vec<BriefItem>,
    /// Items whose URL was repaired from the candidate list.
    pub recovered: usize,
    /// Items dropped because their URL was not in the allow-set.
    pub rejected: Vec<BriefItem>,
}

/// Cross-checks brief items against the candidates actually offered to the
/// generator.
#[derive(Debug, Clone)]
pub struct ProvenanceValidator {
    allow: HashSet<String>,
    by_title: HashMap<String, String>,
    by_id: HashMap<String, String>,
    rule: PlaceholderRule,
    placeholder_urls: Vec<String>,
}

impl ProvenanceValidator {
    /// A validator with an allow-set and no recovery maps.
    pub fn new<I, S>(allow: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            by_title: HashMap::new(),
            by_id: HashMap::new(),
            rule: PlaceholderRule::Listed,
            placeholder_urls: Vec::new(),
        }
    }

    /// Allow-set, title map and ID map all built from the same candidate set,
    /// with the placeholder settings of `format`.
    pub fn from_candidates(set: &CandidateSet, format: &BriefFormat) -> Self {
        Self::new(set.urls())
            .with_titles(set.links().map(|l| (l.title.clone(), l.url.clone())))
            .with_ids(set.candidates.iter().map(|c| (c.id.clone(), c.link.url.clone())))
            .with_placeholders(format.placeholder_rule.clone(), format.placeholder_urls.clone())
    }

    /// Title → URL map used for recovery. Titles are whitespace-collapsed;
    /// the first URL for a title wins.
    pub fn with_titles<I>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (title, url) in titles {
            self.by_title.entry(normalize_whitespace(&title)).or_insert(url);
        }
        self
    }

    pub fn with_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (id, url) in ids {
            self.by_id.entry(id.trim().to_string()).or_insert(url);
        }
        self
    }

    pub fn with_placeholders(mut self, rule: PlaceholderRule, urls: Vec<String>) -> Self {
        self.rule = rule;
        self.placeholder_urls = urls;
        self
    }

    pub fn allows(&self, url: &str) -> bool {
        self.allow.contains(url)
    }

    fn needs_recovery(&self, url: &str) -> bool {
        url.trim().is_empty() || is_placeholder_url(url, &self.rule, &self.placeholder_urls)
    }

    fn lookup(&self, item: &BriefItem) -> Option<&String> {
        item.id
            .as_deref()
            .and_then(|id| self.by_id.get(id.trim()))
            .or_else(|| self.by_title.get(&normalize_whitespace(&item.title)))
    }

    /// Step 1: repair empty or placeholder URLs from the candidate maps.
    /// Returns the items and how many were repaired.
    pub fn recover(&self, items: Vec<BriefItem>) -> (Vec<BriefItem>, usize) {
        let mut recovered = 0;
        let items = items
            .into_iter()
            .map(|mut item| {
                if self.needs_recovery(&item.url) {
                    if let Some(url) = self.lookup(&item) {
                        debug!(title = %item.title, from = %item.url, to = %url, "Recovered item URL");
                        item.url = url.clone();
                        recovered += 1;
                    }
                }
                item
            })
            .collect();
        (items, recovered)
    }

    /// Recovery, then the strict allow-set check, then truncation to `max`.
    pub fn validate(&self, items: Vec<BriefItem>, max: usize) -> Validation {
        let (items, recovered) = self.recover(items);
        let (mut kept, rejected): (Vec<BriefItem>, Vec<BriefItem>) =
            items.into_iter().partition(|item| self.allows(&item.url));
        for item in &rejected {
            debug!(title = %item.title, url = %item.url, "Dropped item with URL outside the candidate list");
        }
        kept.truncate(max);
        Validation {
            items: kept,
            recovered,
            rejected,
        }
    }

    /// Keep only the URLs that are in the allow-set; used for
    /// provider-supplied grounding citations.
    pub fn filter_urls<'u>(&self, urls: &'u [String]) -> Vec<&'u str> {
        urls.iter()
            .map(String::as_str)
            .filter(|u| self.allows(u))
            .collect()
    }
}
