//! Parsing and provenance validation of generated briefings.
//!
//! The generator is asked for a semi-structured text:
//!
//! ```text
//! ==한국 주요뉴스 TOP5==
//! ### 1. 제목
//! - 요약1
//! - 요약2
//! - 요약3
//! 한줄결론: ...
//! URL: https://...
//!
//! ==세계 경제 주요뉴스 TOP5==
//! ### 1. ID: WD-01 | 제목
//! ...
//! ```
//!
//! The pipeline is [`sections::split_sections`] →
//! [`items::parse_items_raw`] → [`provenance::ProvenanceValidator`]. Every
//! step is pure; the patterns and markers are carried by one [`BriefFormat`]
//! value built from configuration and passed explicitly.

pub mod items;
pub mod normalize;
pub mod provenance;
pub mod sections;

use crate::config::BriefConfig;
use provenance::PlaceholderRule;
use regex::Regex;

/// Compiled markers and line patterns for one run.
#[derive(Debug, Clone)]
pub struct BriefFormat {
    pub domestic_marker: String,
    pub world_marker: String,
    pub max_bullets: usize,
    pub placeholder_rule: PlaceholderRule,
    pub placeholder_urls: Vec<String>,
    pub(crate) block_start: Regex,
    pub(crate) heading: Regex,
    pub(crate) conclusion: Regex,
    pub(crate) url_line: Regex,
}

impl BriefFormat {
    pub fn new(config: &BriefConfig) -> Result<Self, regex::Error> {
        let token = regex::escape(config.heading_token.trim());
        let label = regex::escape(config.conclusion_label.trim());
        Ok(Self {
            domestic_marker: config.domestic_marker.clone(),
            world_marker: config.world_marker.clone(),
            max_bullets: config.max_bullets,
            placeholder_rule: config.placeholder_rule.clone(),
            placeholder_urls: config.placeholder_urls.clone(),
            block_start: Regex::new(&format!(r"^{token}\s*\d+\."))?,
            heading: Regex::new(&format!(
                r"^{token}\s*(\d+)\.\s*(?:(?i:ID)\s*:\s*([A-Za-z]+-\d+)\s*\|\s*)?(.+)$"
            ))?,
            conclusion: Regex::new(&format!(r"(?i)^{label}\s*:\s*(.*)$"))?,
            url_line: Regex::new(r"(?i)^URL:\s*(https?://.*)$")?,
        })
    }

    /// Same patterns with different section markers.
    #[cfg(test)]
    pub fn with_markers(mut self, domestic: &str, world: &str) -> Self {
        self.domestic_marker = domestic.to_string();
        self.world_marker = world.to_string();
        self
    }
}

impl Default for BriefFormat {
    fn default() -> Self {
        Self::new(&BriefConfig::default()).expect("default brief patterns compile")
    }
}
