//! Naver News daily "most viewed" ranking scraper.
//!
//! Each section (100 politics … 105 IT/science) has a ranking page listing
//! the day's most read articles per press outlet:
//!
//! `https://news.naver.com/main/ranking/popularDay.naver?rankingType=popular_day&sectionId=101&date=20250101`

use crate::config::ScrapeConfig;
use crate::http::HttpFetcher;
use crate::models::CandidateLink;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

const NAVER_BASE: &str = "https://news.naver.com";

/// Path fragments that mark promotional entries mixed into the ranking list.
const PROMO_MARKERS: [&str; 4] = ["subscribe", "membership", "promo", "event"];

static ITEM_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".rankingnews_box .rankingnews_list li a").expect("static selector"));
static ITEM_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".list_title").expect("static selector"));

/// Ranking page URL for one section and a `YYYYMMDD` date.
pub fn ranking_url(section_id: u32, date: &str) -> String {
    format!(
        "{NAVER_BASE}/main/ranking/popularDay.naver?rankingType=popular_day&sectionId={section_id}&date={date}"
    )
}

/// Extract the ranked article links of one ranking page.
///
/// Relative links are resolved against `news.naver.com`, promotional entries
/// are dropped, and the first occurrence of each URL wins.
pub fn extract_ranking(html: &str) -> Vec<CandidateLink> {
    let document = Html::parse_document(html);
    let Ok(base) = Url::parse(NAVER_BASE) else {
        return Vec::new();
    };

    document
        .select(&ITEM_LINK)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let url = base.join(href).ok()?;
            if !matches!(url.scheme(), "http" | "https") {
                return None;
            }
            let url = url.to_string();
            if PROMO_MARKERS.iter().any(|m| url.contains(m)) {
                return None;
            }
            let title: String = match a.select(&ITEM_TITLE).next() {
                Some(t) => t.text().collect(),
                None => a.text().collect(),
            };
            CandidateLink::new(&title, &url)
        })
        .unique_by(|c| c.url.clone())
        .collect()
}

/// Keep the titles mentioning one of `keywords` (case-insensitive), unless
/// that leaves fewer than `min` entries, in which case the list is returned
/// unchanged.
pub fn filter_by_keywords(list: Vec<CandidateLink>, keywords: &[String], min: usize) -> Vec<CandidateLink> {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let filtered: Vec<CandidateLink> = list
        .iter()
        .filter(|c| {
            let title = c.title.to_lowercase();
            lowered.iter().any(|k| title.contains(k.as_str()))
        })
        .cloned()
        .collect();
    debug!(total = list.len(), filtered = filtered.len(), min, "Applied economy keyword filter");
    if filtered.len() >= min { filtered } else { list }
}

/// Fetch and extract one section's ranking page.
#[instrument(level = "info", skip(fetcher))]
pub async fn fetch_section(fetcher: &HttpFetcher, section_id: u32, date: &str) -> Result<Vec<CandidateLink>, Box<dyn Error>> {
    let html = fetcher.fetch_text(&ranking_url(section_id, date)).await?;
    let list = extract_ranking(&html);
    info!(count = list.len(), "Indexed Naver ranking section");
    Ok(list)
}

/// Domestic candidates: the top `per_section` entries of every configured
/// section, in section order, URL-unique. A failing section is skipped.
#[instrument(level = "info", skip_all)]
pub async fn domestic_candidates(fetcher: &HttpFetcher, config: &ScrapeConfig, date: &str) -> Vec<CandidateLink> {
    let mut pool = Vec::new();
    for (i, section_id) in config.naver_sections.iter().enumerate() {
        if i > 0 {
            sleep(config.delay()).await;
        }
        match fetch_section(fetcher, *section_id, date).await {
            Ok(list) => pool.extend(list.into_iter().take(config.per_section)),
            Err(e) => warn!(section_id, error = %e, "Naver section fetch failed; skipping"),
        }
    }
    let pool: Vec<CandidateLink> = pool.into_iter().unique_by(|c| c.url.clone()).collect();
    info!(count = pool.len(), "Collected Naver domestic candidates");
    pool
}

/// World-economy candidates from the world section, filtered by the
/// configured economy keywords.
#[instrument(level = "info", skip_all)]
pub async fn world_candidates(
    fetcher: &HttpFetcher,
    config: &ScrapeConfig,
    date: &str,
    min: usize,
) -> Result<Vec<CandidateLink>, Box<dyn Error>> {
    let list = fetch_section(fetcher, config.naver_world_section, date).await?;
    Ok(filter_by_keywords(list, &config.world_keywords, min))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div class="rankingnews_box">
  <strong class="rankingnews_name">언론사A</strong>
  <ul class="rankingnews_list">
    <li><a href="https://n.news.naver.com/article/001/0000000001"><span class="list_title">코스피 2% 상승 마감</span></a></li>
    <li><a href="/article/001/0000000002"><span class="list_title">  환율 1400원
      돌파 </span></a></li>
    <li><a href="https://n.news.naver.com/promo/subscribe"><span class="list_title">구독하고 선물 받기</span></a></li>
    <li><a href="https://n.news.naver.com/article/001/0000000001"><span class="list_title">중복 기사</span></a></li>
  </ul>
</div>
<div class="rankingnews_box">
  <ul class="rankingnews_list">
    <li><a href="https://n.news.naver.com/article/002/0000000003">유가 급등에 물가 우려</a></li>
    <li><a href="javascript:void(0)"><span class="list_title">스크립트 링크</span></a></li>
    <li><a href="https://n.news.naver.com/article/002/0000000004"><span class="list_title">   </span></a></li>
  </ul>
</div>
</body></html>
"#;

    #[test]
    fn test_ranking_url() {
        assert_eq!(
            ranking_url(101, "20250102"),
            "https://news.naver.com/main/ranking/popularDay.naver?rankingType=popular_day&sectionId=101&date=20250102"
        );
    }

    #[test]
    fn test_extract_ranking() {
        let list = extract_ranking(PAGE);
        let pairs: Vec<(&str, &str)> = list.iter().map(|c| (c.title.as_str(), c.url.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("코스피 2% 상승 마감", "https://n.news.naver.com/article/001/0000000001"),
                ("환율 1400원 돌파", "https://news.naver.com/article/001/0000000002"),
                ("유가 급등에 물가 우려", "https://n.news.naver.com/article/002/0000000003"),
            ]
        );
    }

    #[test]
    fn test_extract_ranking_empty_page() {
        assert!(extract_ranking("<html><body><p>점검 중</p></body></html>").is_empty());
    }

    #[test]
    fn test_filter_by_keywords() {
        let list = extract_ranking(PAGE);
        let keywords = vec!["환율".to_string(), "유가".to_string()];
        let filtered = filter_by_keywords(list.clone(), &keywords, 2);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|c| c.title.contains("환율") || c.title.contains("유가")));

        let fallback = filter_by_keywords(list.clone(), &keywords, 3);
        assert_eq!(fallback, list);
    }

    #[test]
    fn test_filter_by_keywords_is_case_insensitive() {
        let list = vec![CandidateLink::new("FED holds rates", "https://s.a/1").unwrap()];
        let filtered = filter_by_keywords(list, &["fed".to_string()], 1);
        assert_eq!(filtered.len(), 1);
    }
}
