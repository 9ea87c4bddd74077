//! Daum News front page scraper.
//!
//! Article links on both the home page and the section pages point at
//! `https://v.daum.net/v/<id>`; everything else on the page is navigation.

use crate::http::HttpFetcher;
use crate::models::CandidateLink;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use tracing::{info, instrument};

/// Anchor texts shorter than this are menu entries, not headlines.
pub const MIN_TITLE_CHARS: usize = 8;

static ARTICLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="https://v.daum.net/v/"]"#).expect("static selector"));

/// `home` maps to the front page, anything else to `news.daum.net/<section>`.
pub fn section_url(section: &str) -> String {
    match section.trim() {
        "" | "home" => "https://news.daum.net/".to_string(),
        other => format!("https://news.daum.net/{other}"),
    }
}

fn is_headline(title: &str) -> bool {
    title.chars().count() >= MIN_TITLE_CHARS && !title.to_lowercase().contains("google news")
}

/// Extract article links in page order, URL-unique.
pub fn extract_links(html: &str) -> Vec<CandidateLink> {
    let document = Html::parse_document(html);
    document
        .select(&ARTICLE_LINK)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let title: String = a.text().collect();
            CandidateLink::new(&title, href)
        })
        .filter(|c| is_headline(&c.title))
        .unique_by(|c| c.url.clone())
        .collect()
}

#[instrument(level = "info", skip(fetcher))]
pub async fn candidates(fetcher: &HttpFetcher, section: &str, limit: usize) -> Result<Vec<CandidateLink>, Box<dyn Error>> {
    let html = fetcher.fetch_text(&section_url(section)).await?;
    let mut list = extract_links(&html);
    list.truncate(limit);
    info!(count = list.len(), "Indexed Daum article links");
    Ok(list)
}
