//! YAML configuration for every pipeline run.
//!
//! All fields carry defaults, so a run without `--config` behaves exactly like
//! a run with an empty file. Secrets never live here; they come from the
//! environment through [`crate::cli::Cli`].
//!
//! ```yaml
//! brief:
//!   domestic_marker: "==한국 주요뉴스"
//!   world_marker: "==세계 경제 주요뉴스"
//! limits:
//!   domestic: 5
//!   world: 5
//! gemini:
//!   model: gemini-flash-latest
//! ```

use crate::brief::provenance::PlaceholderRule;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub brief: BriefConfig,
    pub limits: Limits,
    pub gemini: GeminiConfig,
    pub kakao: KakaoConfig,
    pub scrape: ScrapeConfig,
    pub feeds: FeedsConfig,
    pub summarize: SummarizeConfig,
}

impl Config {
    /// Load configuration from a YAML file, or return the defaults when no
    /// path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No config file given; using built-in defaults");
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).await?;
        let config = Self::from_yaml(&raw)?;
        info!(path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

/// Markers and line labels of the generated briefing text.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BriefConfig {
    pub domestic_marker: String,
    pub world_marker: String,
    pub heading_token: String,
    pub conclusion_label: String,
    pub max_bullets: usize,
    pub placeholder_rule: PlaceholderRule,
    /// Literal URLs that are always treated as placeholders.
    pub placeholder_urls: Vec<String>,
    /// List candidates as `KR-01`/`WD-01` IDs in the prompt.
    pub use_ids: bool,
    pub include_conclusion: bool,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            domestic_marker: "==한국 주요뉴스".to_string(),
            world_marker: "==세계 경제 주요뉴스".to_string(),
            heading_token: "###".to_string(),
            conclusion_label: "한줄결론".to_string(),
            max_bullets: 3,
            placeholder_rule: PlaceholderRule::RootPath,
            placeholder_urls: vec!["https://n.news.naver.com".to_string()],
            use_ids: false,
            include_conclusion: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// Items sent for the domestic section.
    pub domestic: usize,
    /// Items sent for the world section.
    pub world: usize,
    /// Candidates offered to the generator for the domestic section.
    pub candidates_domestic: usize,
    /// Candidates offered to the generator for the world section.
    pub candidates_world: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            domestic: 5,
            world: 5,
            candidates_domestic: 30,
            candidates_world: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    /// Generated text shorter than this is treated as malformed.
    pub min_output_chars: usize,
    pub max_reprompts: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-flash-latest".to_string(),
            temperature: 0.4,
            max_output_tokens: 3000,
            timeout_secs: 60,
            max_attempts: 6,
            base_delay_ms: 1200,
            min_output_chars: 200,
            max_reprompts: 1,
        }
    }
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KakaoConfig {
    pub api_base: String,
    pub auth_base: String,
    pub token_cache_path: String,
    /// Hard cap on one message's text, in characters.
    pub max_chars: usize,
    /// Chunk size used when a free-text notice is split.
    pub chunk_chars: usize,
    pub send_delay_ms: u64,
    pub button_title: String,
    /// Link attached to notices that are not about a single article.
    pub default_link: String,
    pub brand: String,
    pub timeout_secs: u64,
}

impl Default for KakaoConfig {
    fn default() -> Self {
        Self {
            api_base: "https://kapi.kakao.com".to_string(),
            auth_base: "https://kauth.kakao.com".to_string(),
            token_cache_path: ".kakao_token_cache.json".to_string(),
            max_chars: 950,
            chunk_chars: 800,
            send_delay_ms: 350,
            button_title: "더보기".to_string(),
            default_link: "https://news.daum.net/".to_string(),
            brand: "경제 코끼리".to_string(),
            timeout_secs: 15,
        }
    }
}

impl KakaoConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    /// Pause between two requests to the same family of sites.
    pub delay_ms: u64,
    pub naver_sections: Vec<u32>,
    pub naver_world_section: u32,
    pub per_section: usize,
    pub world_keywords: Vec<String>,
    pub google_news_query: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122 Safari/537.36".to_string(),
            accept_language: "ko-KR,ko;q=0.9,en;q=0.6".to_string(),
            timeout_secs: 20,
            max_attempts: 3,
            base_delay_ms: 800,
            delay_ms: 300,
            naver_sections: vec![100, 101, 102, 103, 104, 105],
            naver_world_section: 104,
            per_section: 10,
            world_keywords: [
                "금리", "환율", "달러", "유가", "원유", "물가", "인플레", "증시", "주가", "채권",
                "경기", "성장", "침체", "연준", "fed", "ecb", "boj", "중앙은행", "관세", "무역",
                "반도체", "원자재", "금값",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            google_news_query: "global economy OR stock market OR inflation OR central bank OR oil price OR exchange rate".to_string(),
        }
    }
}

impl ScrapeConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub sources: Vec<FeedSource>,
    pub top_n: usize,
    pub state_path: String,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        let source = |name: &str, url: &str| FeedSource {
            name: name.to_string(),
            url: url.to_string(),
        };
        Self {
            sources: vec![
                source("연합뉴스 경제", "https://www.yna.co.kr/rss/economy.xml"),
                source("매일경제", "https://www.mk.co.kr/rss/30000001/"),
                source("한국경제", "https://rss.hankyung.com/new/news_economy.xml"),
            ],
            top_n: 5,
            state_path: "state_econ.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummarizeConfig {
    /// `home` or `economic`.
    pub daum_section: String,
    pub limit: usize,
    pub min_article_chars: usize,
    pub max_article_chars: usize,
    pub summary_lines: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            daum_section: "economic".to_string(),
            limit: 10,
            min_article_chars: 200,
            max_article_chars: 4500,
            summary_lines: 3,
            temperature: 0.2,
            max_output_tokens: 400,
        }
    }
}
