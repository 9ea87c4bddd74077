//! Google News RSS search, used for world-economy candidates.

use super::rss::parse_feed;
use crate::http::HttpFetcher;
use crate::models::CandidateLink;
use itertools::Itertools;
use std::error::Error;
use tracing::{info, instrument};

pub fn search_url(query: &str) -> String {
    format!(
        "https://news.google.com/rss/search?q={}&hl=en-US&gl=US&ceid=US:en",
        urlencoding::encode(query)
    )
}

/// Candidates from a Google News RSS document, title-unique then URL-unique.
pub fn extract_candidates(xml: &str) -> Result<Vec<CandidateLink>, Box<dyn Error>> {
    let items = parse_feed(xml, "Google News")?;
    Ok(items
        .into_iter()
        .filter_map(|item| CandidateLink::new(&item.title, &item.link))
        .unique_by(|c| c.title.clone())
        .unique_by(|c| c.url.clone())
        .collect())
}

#[instrument(level = "info", skip(fetcher))]
pub async fn candidates(fetcher: &HttpFetcher, query: &str, limit: usize) -> Result<Vec<CandidateLink>, Box<dyn Error>> {
    let xml = fetcher.fetch_text(&search_url(query)).await?;
    let mut list = extract_candidates(&xml)?;
    list.truncate(limit);
    info!(count = list.len(), "Indexed Google News search results");
    Ok(list)
}
