//! News source scrapers that discover candidate article links.
//!
//! Every scraper returns `{title, url}` pairs that are URL-unique and already
//! stripped of navigation and promotional noise. The pure `extract_*`
//! functions are tested against inline HTML/XML; the async wrappers only add
//! the fetch.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Used for |
//! |--------|--------|--------|----------|
//! | Naver ranking | [`naver`] | HTML scraping | Domestic and world candidates |
//! | Daum News | [`daum`] | HTML scraping | Domestic candidates, per-article summaries |
//! | Google News | [`google_news`] | RSS search | World fallback |
//! | Press RSS feeds | [`rss`] | RSS 2.0 | The feed digest |
//! | Article pages | [`article`] | HTML scraping | Body text for summaries |
//!
//! Requests to one family of sites are spaced by the configured scrape delay.
//! A failing source is logged and skipped; an empty section is reported by
//! the caller.

pub mod article;
pub mod daum;
pub mod google_news;
pub mod naver;
pub mod rss;

use crate::config::{Limits, ScrapeConfig};
use crate::http::HttpFetcher;
use crate::models::{CandidateLink, CandidateSet};
use itertools::Itertools;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

pub const DOMESTIC: &str = "domestic";
pub const WORLD: &str = "world";

/// Merge lists in order, dropping repeated titles and URLs, and keep the
/// first `cap` entries.
pub fn merge_candidates(lists: Vec<Vec<CandidateLink>>, cap: usize) -> Vec<CandidateLink> {
    lists
        .into_iter()
        .flatten()
        .unique_by(|c| c.title.clone())
        .unique_by(|c| c.url.clone())
        .take(cap)
        .collect()
}

/// Domestic pool: Naver rankings first, then the Daum front page.
#[instrument(level = "info", skip_all)]
pub async fn collect_domestic(fetcher: &HttpFetcher, config: &ScrapeConfig, limits: &Limits, date: &str) -> CandidateSet {
    let naver = naver::domestic_candidates(fetcher, config, date).await;
    sleep(config.delay()).await;
    let daum = match daum::candidates(fetcher, "home", limits.candidates_domestic).await {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "Daum front page fetch failed; skipping");
            Vec::new()
        }
    };
    let merged = merge_candidates(vec![naver, daum], limits.candidates_domestic);
    info!(count = merged.len(), "Collected domestic candidates");
    CandidateSet::new(DOMESTIC, "KR", merged)
}

/// World pool: the keyword-filtered Naver world ranking, topped up from a
/// Google News search when it holds fewer than the requested candidates.
#[instrument(level = "info", skip_all)]
pub async fn collect_world(fetcher: &HttpFetcher, config: &ScrapeConfig, limits: &Limits, date: &str) -> CandidateSet {
    let naver = match naver::world_candidates(fetcher, config, date, limits.world).await {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "Naver world ranking fetch failed; skipping");
            Vec::new()
        }
    };

    let google = if naver.len() < limits.candidates_world {
        match google_news::candidates(fetcher, &config.google_news_query, limits.candidates_world).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Google News search failed; skipping");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let merged = merge_candidates(vec![naver, google], limits.candidates_world);
    info!(count = merged.len(), "Collected world candidates");
    CandidateSet::new(WORLD, "WD", merged)
}
