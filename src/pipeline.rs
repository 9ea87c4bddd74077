//! The four runs behind the subcommands.
//!
//! - [`run_brief`]: scrape candidates, generate, validate, deliver, archive
//! - [`run_feeds`]: RSS digest of entries not sent before
//! - [`run_summarize`]: one generated summary per Daum article
//! - [`run_parse`]: validate a saved briefing offline
//!
//! Network collection is kept apart from the decision logic: the `*_from_*`
//! functions take already-fetched input plus an [`AskAsync`] and a
//! [`ChatSender`], so they can be driven by fakes.

use crate::api::{ApiError, AskAsync, Generation};
use crate::brief::BriefFormat;
use crate::brief::items::parse_items_raw;
use crate::brief::provenance::{ProvenanceValidator, Validation};
use crate::brief::sections::split_sections;
use crate::config::{Config, KakaoConfig, Limits};
use crate::http::HttpFetcher;
use crate::kakao::ChatSender;
use crate::models::{BriefArchive, BriefItem, CandidateLink, CandidateSet, ChatMessage, FeedItem};
use crate::outputs::json::write_archive;
use crate::outputs::message::{
    failure_notice, feed_digest, item_message, notice_messages, summary_failure_message, summary_message,
    title_only_digest,
};
use crate::prompt::{self, RetryIssues};
use crate::scrapers::article::{Article, fetch_article};
use crate::scrapers::{self, DOMESTIC, WORLD, daum, rss};
use crate::state::SentState;
use crate::utils::{now_kst, now_kst_string, now_ms, today_compact_kst, today_kst, truncate_for_log};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde::Deserialize;
use std::error::Error;
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

pub const DOMESTIC_CATEGORY: &str = "한국 주요뉴스";
pub const WORLD_CATEGORY: &str = "세계 경제";
pub const NO_NEWS_NOTICE: &str = "📌 오늘 새로 올라온 경제 뉴스가 아직 없어요.";
const NO_MATCH_REASON: &str = "후보 목록과 일치하는 항목이 없음";
const EMPTY_BODY_REASON: &str = "본문 추출 실패";
/// Fewer Daum candidates than this (or than the configured limit) aborts a
/// summarize run.
const MIN_SUMMARY_CANDIDATES: usize = 5;

/// Parse and validation outcome of one section of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionResult {
    pub name: String,
    /// Candidates that were offered for the section.
    pub candidates: usize,
    /// Items parsed before validation.
    pub parsed: usize,
    pub validation: Validation,
}

impl SectionResult {
    fn evaluate(text: &str, format: &BriefFormat, set: &CandidateSet, limit: usize) -> Self {
        let raw = parse_items_raw(text, format);
        let parsed = raw.len();
        let validation = ProvenanceValidator::from_candidates(set, format).validate(raw, limit);
        let valid = validation.items.len();
        if valid < limit {
            info!(section = %set.name, parsed, valid, expected = limit, "Section has fewer items than requested");
        }
        Self {
            name: set.name.clone(),
            candidates: set.len(),
            parsed,
            validation,
        }
    }

    pub fn items(&self) -> &[BriefItem] {
        &self.validation.items
    }

    /// Nothing was parsed although there were candidates to choose from.
    fn is_empty_with_candidates(&self) -> bool {
        self.parsed == 0 && self.candidates > 0
    }
}

/// One generated briefing, split, parsed and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BriefEvaluation {
    pub degraded: bool,
    pub domestic: SectionResult,
    pub world: SectionResult,
}

impl BriefEvaluation {
    /// Validated items across both sections; the best attempt maximizes it.
    pub fn score(&self) -> usize {
        self.domestic.items().len() + self.world.items().len()
    }

    pub fn issues(&self) -> RetryIssues {
        RetryIssues {
            degraded: self.degraded,
            empty_sections: [&self.domestic, &self.world]
                .into_iter()
                .filter(|s| s.is_empty_with_candidates())
                .map(|s| s.name.clone())
                .collect(),
            rejected_urls: self.domestic.validation.rejected.len() + self.world.validation.rejected.len(),
        }
    }
}

/// Split, parse and validate one briefing text against the candidates that
/// were offered for it.
pub fn evaluate_brief(
    text: &str,
    format: &BriefFormat,
    domestic: &CandidateSet,
    world: &CandidateSet,
    limits: &Limits,
) -> BriefEvaluation {
    let sections = split_sections(text, &format.domestic_marker, &format.world_marker);
    BriefEvaluation {
        degraded: sections.degraded,
        domestic: SectionResult::evaluate(&sections.a, format, domestic, limits.domestic),
        world: SectionResult::evaluate(&sections.b, format, world, limits.world),
    }
}

/// Ask for a briefing, re-prompting with a note about what went wrong up to
/// `gemini.max_reprompts` times. The attempt with the most validated items
/// wins; ties keep the earlier one.
///
/// Errors when every attempt came back malformed, or when the generator
/// itself failed after its own retries before any attempt produced text. A
/// failed re-prompt keeps the best earlier attempt.
#[instrument(level = "info", skip_all, fields(domestic = domestic.len(), world = world.len()))]
pub async fn generate_brief<A: AskAsync>(
    api: &A,
    config: &Config,
    format: &BriefFormat,
    domestic: &CandidateSet,
    world: &CandidateSet,
    now_kst: &str,
) -> Result<BriefEvaluation, ApiError> {
    let base = prompt::brief_prompt(&config.brief, &config.limits, &config.kakao.brand, now_kst, domestic, world);
    let grounding_check = ProvenanceValidator::new(domestic.urls().chain(world.urls()));

    let mut best: Option<BriefEvaluation> = None;
    let mut issues = RetryIssues::default();
    let mut last_problem = String::from("no attempt made");

    for attempt in 0..=config.gemini.max_reprompts {
        let prompt = if attempt == 0 {
            base.clone()
        } else {
            info!(attempt, ?issues, "Re-prompting with a correction note");
            format!("{base}\n\n{}", prompt::retry_note(&issues, &config.brief))
        };

        let generation = match api.ask(&prompt).await {
            Ok(generation) => generation,
            Err(e) if best.is_some() => {
                warn!(attempt, error = %e, "Re-prompt failed; keeping the best earlier attempt");
                break;
            }
            Err(e) => return Err(e),
        };

        match generation {
            Generation::Malformed(reason) => {
                warn!(attempt, %reason, "Generator returned no usable briefing");
                issues = RetryIssues {
                    degraded: false,
                    empty_sections: vec![DOMESTIC.to_string(), WORLD.to_string()],
                    rejected_urls: 0,
                };
                last_problem = reason;
            }
            Generation::Text { text, grounding_urls } => {
                debug!(text = %truncate_for_log(&text, 600), "Generated briefing");
                if !grounding_urls.is_empty() {
                    let inside = grounding_check.filter_urls(&grounding_urls).len();
                    info!(grounding = grounding_urls.len(), inside, "Grounding citations checked against candidates");
                }

                let evaluation = evaluate_brief(&text, format, domestic, world, &config.limits);
                issues = evaluation.issues();
                info!(
                    attempt,
                    degraded = evaluation.degraded,
                    domestic_parsed = evaluation.domestic.parsed,
                    domestic_valid = evaluation.domestic.items().len(),
                    world_parsed = evaluation.world.parsed,
                    world_valid = evaluation.world.items().len(),
                    rejected = issues.rejected_urls,
                    "Evaluated briefing attempt"
                );

                let clean = issues.is_clean();
                if best.as_ref().is_none_or(|b| evaluation.score() > b.score()) {
                    best = Some(evaluation);
                }
                if clean {
                    break;
                }
            }
        }
    }

    best.ok_or_else(|| ApiError::fatal(format!("no usable briefing: {last_problem}")))
}

/// Send `messages` one at a time with `delay` between them. A failed send
/// is logged and skipped; returns how many went out.
pub async fn send_all<S: ChatSender>(sender: &S, messages: &[ChatMessage], delay: Duration) -> usize {
    let mut sent = 0;
    for (i, message) in messages.iter().enumerate() {
        if i > 0 {
            sleep(delay).await;
        }
        match sender.send(message).await {
            Ok(()) => sent += 1,
            Err(e) => error!(index = i, error = %e, "Failed to send message"),
        }
    }
    sent
}

/// Send a free-text notice, chunked when long.
pub async fn notify<S: ChatSender>(sender: &S, text: &str, kakao: &KakaoConfig) -> Result<(), ApiError> {
    for (i, message) in notice_messages(text, kakao).iter().enumerate() {
        if i > 0 {
            sleep(kakao.send_delay()).await;
        }
        sender.send(message).await?;
    }
    Ok(())
}

/// Deliver one section: its validated items, or a failure notice followed by
/// a title-only digest of the candidates. Returns `true` when the fallback
/// was used.
async fn deliver_section<S: ChatSender>(
    sender: &S,
    kakao: &KakaoConfig,
    date: &str,
    category: &str,
    items: &[BriefItem],
    candidates: &CandidateSet,
    limit: usize,
    failure: Option<&str>,
) -> bool {
    if !items.is_empty() {
        let messages: Vec<ChatMessage> = items
            .iter()
            .map(|item| item_message(date, category, item, kakao))
            .collect();
        let sent = send_all(sender, &messages, kakao.send_delay()).await;
        info!(category, sent, total = messages.len(), "Delivered briefing section");
        return false;
    }

    warn!(category, "No validated items; sending title-only digest");
    let notice = failure_notice(&format!("{category} 브리핑"), failure.unwrap_or(NO_MATCH_REASON));
    if let Err(e) = notify(sender, &notice, kakao).await {
        error!(category, error = %e, "Failed to send failure notice");
    }
    let links: Vec<CandidateLink> = candidates.links().cloned().collect();
    sleep(kakao.send_delay()).await;
    if let Err(e) = sender
        .send(&title_only_digest(date, category, &links, limit, kakao))
        .await
    {
        error!(category, error = %e, "Failed to send title-only digest");
    }
    true
}

/// Generate, validate and deliver a briefing for already collected
/// candidates, then archive it when `archive_dir` is given.
///
/// A section without candidates is not sent at all and makes the run fail
/// after the other section went out. Both sections empty fails before
/// anything is generated.
#[instrument(level = "info", skip_all, fields(date = %date))]
pub async fn brief_from_candidates<A: AskAsync, S: ChatSender>(
    api: &A,
    sender: &S,
    config: &Config,
    format: &BriefFormat,
    domestic: &CandidateSet,
    world: &CandidateSet,
    date: &str,
    archive_dir: Option<&str>,
) -> Result<BriefArchive, Box<dyn Error>> {
    if domestic.is_empty() && world.is_empty() {
        return Err("no candidates collected for either section".into());
    }

    let (degraded, domestic_items, world_items, failure) =
        match generate_brief(api, config, format, domestic, world, &now_kst_string()).await {
            Ok(evaluation) => (
                evaluation.degraded,
                evaluation.domestic.validation.items,
                evaluation.world.validation.items,
                None,
            ),
            Err(e) => {
                error!(error = %e, "Briefing generation failed");
                (true, Vec::new(), Vec::new(), Some(e.to_string()))
            }
        };

    let sections = [
        (domestic, DOMESTIC_CATEGORY, &domestic_items, config.limits.domestic),
        (world, WORLD_CATEGORY, &world_items, config.limits.world),
    ];
    let mut fallback_sections = Vec::new();
    for (i, (set, category, items, limit)) in sections.into_iter().enumerate() {
        if set.is_empty() {
            error!(section = %set.name, "No candidates for section; nothing sent for it");
            continue;
        }
        if i > 0 {
            sleep(config.kakao.send_delay()).await;
        }
        if deliver_section(sender, &config.kakao, date, category, items, set, limit, failure.as_deref()).await {
            fallback_sections.push(set.name.clone());
        }
    }

    let archive = BriefArchive {
        date: date.to_string(),
        generated_at: now_kst().to_rfc3339(),
        degraded,
        domestic: domestic_items,
        world: world_items,
        fallback_sections,
    };
    if let Some(dir) = archive_dir {
        write_archive(&archive, dir).await?;
    }

    if let Some(empty) = [domestic, world].into_iter().find(|s| s.is_empty()) {
        return Err(format!("no candidates collected for the {} section", empty.name).into());
    }
    Ok(archive)
}

/// Full briefing run: scrape today's candidates, then
/// [`brief_from_candidates`].
#[instrument(level = "info", skip_all)]
pub async fn run_brief<A: AskAsync, S: ChatSender>(
    fetcher: &HttpFetcher,
    api: &A,
    sender: &S,
    config: &Config,
    archive_dir: Option<&str>,
) -> Result<BriefArchive, Box<dyn Error>> {
    let format = BriefFormat::new(&config.brief)?;
    let ymd = today_compact_kst();
    let domestic = scrapers::collect_domestic(fetcher, &config.scrape, &config.limits, &ymd).await;
    let world = scrapers::collect_world(fetcher, &config.scrape, &config.limits, &ymd).await;
    info!(domestic = domestic.len(), world = world.len(), "Collected candidates");
    brief_from_candidates(api, sender, config, &format, &domestic, &world, &today_kst(), archive_dir).await
}

/// Entries not sent before, unique by sent-state key, newest first, at most
/// `top_n`.
pub fn select_fresh(items: Vec<FeedItem>, state: &SentState, top_n: usize) -> Vec<FeedItem> {
    let mut fresh: Vec<FeedItem> = items
        .into_iter()
        .filter(|item| item.dedupe_key().is_some_and(|k| !state.contains(&k)))
        .unique_by(|item| item.dedupe_key())
        .collect();
    rss::sort_newest_first(&mut fresh);
    fresh.truncate(top_n);
    fresh
}

/// Send the digest of fresh entries and record them in the sent state.
///
/// The state is saved only after the digest went out, so a failed send
/// leaves the entries eligible for the next run.
#[instrument(level = "info", skip_all, fields(items = items.len(), state_path = %state_path))]
pub async fn feeds_from_items<S: ChatSender>(
    sender: &S,
    config: &Config,
    items: Vec<FeedItem>,
    state_path: &str,
    date: &str,
) -> Result<usize, Box<dyn Error>> {
    let mut state = SentState::load(state_path).await?;
    let top = select_fresh(items, &state, config.feeds.top_n);
    if top.is_empty() {
        info!("No fresh feed entries");
        notify(sender, NO_NEWS_NOTICE, &config.kakao).await?;
        return Ok(0);
    }

    sender.send(&feed_digest(date, &top, &config.kakao)).await?;
    let at = now_ms();
    for key in top.iter().filter_map(FeedItem::dedupe_key) {
        state.record(key, at);
    }
    state.save(state_path).await?;
    info!(sent = top.len(), "Sent feed digest");
    Ok(top.len())
}

/// Fetch every configured feed, then [`feeds_from_items`]. A feed that
/// fails is skipped; every feed failing fails the run.
#[instrument(level = "info", skip_all, fields(sources = config.feeds.sources.len()))]
pub async fn run_feeds<S: ChatSender>(
    fetcher: &HttpFetcher,
    sender: &S,
    config: &Config,
    state_path: &str,
) -> Result<usize, Box<dyn Error>> {
    let fetched: Vec<Option<Vec<FeedItem>>> = stream::iter(config.feeds.sources.iter().enumerate())
        .then(|(i, source)| async move {
            if i > 0 {
                sleep(config.scrape.delay()).await;
            }
            match rss::fetch_feed(fetcher, source).await {
                Ok(found) => Some(found),
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Feed fetch failed; skipping");
                    None
                }
            }
        })
        .collect()
        .await;
    let failures = fetched.iter().filter(|f| f.is_none()).count();
    let items: Vec<FeedItem> = fetched.into_iter().flatten().flatten().collect();
    if !config.feeds.sources.is_empty() && failures == config.feeds.sources.len() {
        return Err("every configured feed failed".into());
    }
    feeds_from_items(sender, config, items, state_path, &today_kst()).await
}

/// Header label of a summarize run.
pub fn summary_label(section: &str, count: usize) -> String {
    match section {
        "" | "home" => format!("전체뉴스 TOP{count}"),
        _ => format!("경제뉴스 TOP{count}"),
    }
}

/// Summarize one extracted article into exactly `summary_lines` lines.
pub async fn summarize_article<A: AskAsync>(
    api: &A,
    article: &Article,
    config: &Config,
) -> Result<Vec<String>, Box<dyn Error>> {
    if article.text.trim().is_empty() {
        return Err(EMPTY_BODY_REASON.into());
    }
    let lines = config.summarize.summary_lines;
    match api.ask(&prompt::summary_prompt(&article.text, lines)).await? {
        Generation::Text { text, .. } => Ok(prompt::fit_summary_lines(&text, lines)),
        Generation::Malformed(reason) => Err(format!("요약 생성 실패 ({reason})").into()),
    }
}

/// Fetch and summarize each Daum candidate, sending one message per article.
/// A failed article gets a failure message that still links to it.
#[instrument(level = "info", skip_all, fields(section = %config.summarize.daum_section))]
pub async fn run_summarize<A: AskAsync, S: ChatSender>(
    fetcher: &HttpFetcher,
    api: &A,
    sender: &S,
    config: &Config,
) -> Result<usize, Box<dyn Error>> {
    let cfg = &config.summarize;
    let list = daum::candidates(fetcher, &cfg.daum_section, cfg.limit).await?;
    let needed = cfg.limit.min(MIN_SUMMARY_CANDIDATES);
    if list.len() < needed {
        return Err(format!("too few Daum candidates: {} (need {needed})", list.len()).into());
    }

    let date = today_kst();
    let label = summary_label(&cfg.daum_section, list.len());
    let mut sent = 0;
    for (i, candidate) in list.iter().enumerate() {
        if i > 0 {
            sleep(config.kakao.send_delay()).await;
        }
        let index = i + 1;
        let outcome = match fetch_article(fetcher, &candidate.url, cfg).await {
            Ok(article) => summarize_article(api, &article, config)
                .await
                .map(|lines| (article.title, lines)),
            Err(e) => Err(e),
        };
        let message = match outcome {
            Ok((title, lines)) => {
                let title = if title.is_empty() { candidate.title.as_str() } else { title.as_str() };
                summary_message(&date, &label, index, title, &lines, &candidate.url, &config.kakao)
            }
            Err(e) => {
                warn!(index, url = %candidate.url, error = %e, "Article summary failed");
                summary_failure_message(&date, &label, index, &candidate.title, &e.to_string(), &candidate.url, &config.kakao)
            }
        };
        match sender.send(&message).await {
            Ok(()) => sent += 1,
            Err(e) => error!(index, error = %e, "Failed to send summary"),
        }
    }
    info!(sent, total = list.len(), "Summarize run finished");
    Ok(sent)
}

/// Candidate lists of a saved run, as read by `parse`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateFile {
    #[serde(default)]
    pub domestic: Vec<CandidateLink>,
    #[serde(default)]
    pub world: Vec<CandidateLink>,
}

impl CandidateFile {
    /// The two sets, normalized the same way the scrapers build them.
    pub fn into_sets(self) -> (CandidateSet, CandidateSet) {
        let normalize = |links: Vec<CandidateLink>| -> Vec<CandidateLink> {
            links
                .iter()
                .filter_map(|l| CandidateLink::new(&l.title, &l.url))
                .collect()
        };
        (
            CandidateSet::new(DOMESTIC, "KR", normalize(self.domestic)),
            CandidateSet::new(WORLD, "WD", normalize(self.world)),
        )
    }
}

/// Validate a saved briefing text against saved candidates.
pub fn parse_offline(text: &str, candidates: CandidateFile, format: &BriefFormat, limits: &Limits) -> BriefArchive {
    let (domestic, world) = candidates.into_sets();
    let evaluation = evaluate_brief(text, format, &domestic, &world, limits);
    for section in [&evaluation.domestic, &evaluation.world] {
        for item in &section.validation.rejected {
            info!(section = %section.name, rank = item.rank, url = %item.url, "Rejected item");
        }
    }
    BriefArchive {
        date: today_kst(),
        generated_at: now_kst().to_rfc3339(),
        degraded: evaluation.degraded,
        domestic: evaluation.domestic.validation.items,
        world: evaluation.world.validation.items,
        fallback_sections: Vec::new(),
    }
}

/// Read both files, validate, and print the result as JSON on stdout.
#[instrument(level = "info", skip(config))]
pub async fn run_parse(brief_path: &str, candidates_path: &str, config: &Config) -> Result<BriefArchive, Box<dyn Error>> {
    let text = fs::read_to_string(brief_path).await?;
    let candidates: CandidateFile = serde_json::from_str(&fs::read_to_string(candidates_path).await?)?;
    let format = BriefFormat::new(&config.brief)?;
    let archive = parse_offline(&text, candidates, &format, &config.limits);
    println!("{}", serde_json::to_string_pretty(&archive)?);
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BriefConfig;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted {
        replies: RefCell<VecDeque<Result<Generation, ApiError>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Generation, ApiError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn text(text: &str) -> Result<Generation, ApiError> {
            Ok(Generation::Text {
                text: text.to_string(),
                grounding_urls: vec![],
            })
        }
    }

    impl AskAsync for Scripted {
        async fn ask(&self, prompt: &str) -> Result<Generation, ApiError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::fatal("script exhausted")))
        }
    }

    #[derive(Default)]
    struct Recording {
        sent: RefCell<Vec<ChatMessage>>,
    }

    impl ChatSender for Recording {
        async fn send(&self, message: &ChatMessage) -> Result<(), ApiError> {
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.kakao.send_delay_ms = 0;
        config.scrape.delay_ms = 0;
        config.limits.domestic = 2;
        config.limits.world = 2;
        config.gemini.max_reprompts = 1;
        config
    }

    fn set(name: &str, prefix: &str, links: &[(&str, &str)]) -> CandidateSet {
        CandidateSet::new(
            name,
            prefix,
            links
                .iter()
                .filter_map(|(t, u)| CandidateLink::new(t, u))
                .collect(),
        )
    }

    fn sets() -> (CandidateSet, CandidateSet) {
        (
            set(DOMESTIC, "KR", &[("Title A", "https://site.a/1"), ("Title D", "https://site.a/2")]),
            set(WORLD, "WD", &[("Title C", "https://site.c/1")]),
        )
    }

    fn brief_text(format: &BriefFormat, domestic_url: &str) -> String {
        format!(
            "{dm}TOP5==\n### 1. Title A\n- x\n- y\n- z\n한줄결론: k\nURL: {domestic_url}\n\n{wm}TOP5==\n### 1. Title C\n- p\nURL: https://site.c/1",
            dm = format.domestic_marker,
            wm = format.world_marker,
        )
    }

    #[test]
    fn test_end_to_end_parse_and_validate() {
        let brief = BriefConfig {
            conclusion_label: "conclusion".to_string(),
            ..BriefConfig::default()
        };
        let format = BriefFormat::new(&brief).unwrap().with_markers("==DOM==", "==WORLD==");
        let domestic = set(DOMESTIC, "KR", &[("Title A", "https://site.a/1")]);
        let world = set(WORLD, "WD", &[("Title C", "https://site.c/1")]);
        let text = "==DOM==\n### 1. Title A\n- b1\n- b2\n- b3\nconclusion: c1\nURL: https://site.a/1\n\n### 2. Title B\n- b1\nURL: https://not-a-candidate.example/x\n==WORLD==\n### 1. Title C\n- b1\nURL: https://site.c/1";

        let evaluation = evaluate_brief(text, &format, &domestic, &world, &Limits::default());
        assert!(!evaluation.degraded);
        assert_eq!(evaluation.domestic.parsed, 2);
        assert_eq!(evaluation.domestic.items().len(), 1);
        let a = &evaluation.domestic.items()[0];
        assert_eq!(a.title, "Title A");
        assert_eq!(a.bullets, vec!["b1", "b2", "b3"]);
        assert_eq!(a.conclusion, "c1");
        assert_eq!(a.url, "https://site.a/1");
        assert_eq!(evaluation.domestic.validation.rejected.len(), 1);
        assert_eq!(evaluation.world.items().len(), 1);
        assert_eq!(evaluation.world.items()[0].title, "Title C");
        assert_eq!(evaluation.issues().rejected_urls, 1);
    }

    #[test]
    fn test_missing_world_marker_is_degraded() {
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let text = format!("{}\n### 1. Title A\n- x\nURL: https://site.a/1", format.domestic_marker);
        let evaluation = evaluate_brief(&text, &format, &domestic, &world, &Limits::default());
        assert!(evaluation.degraded);
        assert_eq!(evaluation.domestic.items().len(), 1);
        let issues = evaluation.issues();
        assert!(issues.degraded);
        assert_eq!(issues.empty_sections, vec![WORLD.to_string()]);
    }

    #[tokio::test]
    async fn test_clean_first_attempt_is_delivered_in_order() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let api = Scripted::new(vec![Scripted::text(&brief_text(&format, "https://site.a/1"))]);
        let sender = Recording::default();
        let dir = tempfile::tempdir().unwrap();

        let archive = brief_from_candidates(
            &api,
            &sender,
            &config,
            &format,
            &domestic,
            &world,
            "2025-01-07",
            dir.path().to_str(),
        )
        .await
        .unwrap();

        assert_eq!(api.prompts.borrow().len(), 1);
        let sent = sender.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.starts_with("🗞️ 2025-01-07 | 한국 주요뉴스 #1"));
        assert_eq!(sent[0].link.as_deref(), Some("https://site.a/1"));
        assert!(sent[1].text.starts_with("🗞️ 2025-01-07 | 세계 경제 #1"));
        assert_eq!(sent[1].link.as_deref(), Some("https://site.c/1"));
        assert!(archive.fallback_sections.is_empty());
        assert!(dir.path().join("2025-01-07/brief.json").exists());
    }

    #[tokio::test]
    async fn test_invented_url_triggers_reprompt() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let api = Scripted::new(vec![
            Scripted::text(&brief_text(&format, "https://invented.example/9")),
            Scripted::text(&brief_text(&format, "https://site.a/1")),
        ]);

        let evaluation = generate_brief(&api, &config, &format, &domestic, &world, "now")
            .await
            .unwrap();

        let prompts = api.prompts.borrow();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("이전 응답의 문제"));
        assert!(prompts[1].starts_with(&prompts[0]));
        assert!(prompts[1].contains("후보 목록에 없는 URL이 1개"));
        assert_eq!(evaluation.domestic.items()[0].url, "https://site.a/1");
    }

    #[tokio::test]
    async fn test_worse_reprompt_keeps_best_attempt() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let first = format!(
            "{}\n### 1. Title A\n- x\nURL: https://site.a/1\n### 2. Title E\n- y\nURL: https://invented.example/2\n{}\n### 1. Title C\n- p\nURL: https://site.c/1",
            format.domestic_marker, format.world_marker
        );
        let api = Scripted::new(vec![Scripted::text(&first), Scripted::text("nothing useful")]);

        let evaluation = generate_brief(&api, &config, &format, &domestic, &world, "now")
            .await
            .unwrap();

        assert_eq!(api.prompts.borrow().len(), 2);
        assert_eq!(evaluation.score(), 2);
        assert!(!evaluation.degraded);
    }

    #[tokio::test]
    async fn test_failed_reprompt_keeps_earlier_attempt() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let first = format!(
            "{}\n### 1. Title A\n- x\nURL: https://site.a/1\n### 2. Title E\n- y\nURL: https://invented.example/2\n{}\n### 1. Title C\n- p\nURL: https://site.c/1",
            format.domestic_marker, format.world_marker
        );
        let api = Scripted::new(vec![
            Scripted::text(&first),
            Err(ApiError::transient("503 after retries")),
        ]);

        let evaluation = generate_brief(&api, &config, &format, &domestic, &world, "now")
            .await
            .unwrap();

        assert_eq!(api.prompts.borrow().len(), 2);
        assert_eq!(evaluation.score(), 2);
        assert_eq!(evaluation.domestic.items()[0].url, "https://site.a/1");
        assert_eq!(evaluation.world.items()[0].url, "https://site.c/1");
    }

    #[tokio::test]
    async fn test_failed_reprompt_still_delivers_earlier_items() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let first = format!(
            "{}\n### 1. Title A\n- x\nURL: https://site.a/1\n### 2. Title E\n- y\nURL: https://invented.example/2\n{}\n### 1. Title C\n- p\nURL: https://site.c/1",
            format.domestic_marker, format.world_marker
        );
        let api = Scripted::new(vec![Scripted::text(&first), Err(ApiError::fatal("HTTP 400"))]);
        let sender = Recording::default();

        let archive = brief_from_candidates(&api, &sender, &config, &format, &domestic, &world, "d", None)
            .await
            .unwrap();

        assert!(archive.fallback_sections.is_empty());
        let sent = sender.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].link.as_deref(), Some("https://site.a/1"));
        assert_eq!(sent[1].link.as_deref(), Some("https://site.c/1"));
    }

    #[tokio::test]
    async fn test_malformed_every_attempt_is_an_error() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let api = Scripted::new(vec![
            Ok(Generation::Malformed("finish_reason SAFETY".to_string())),
            Ok(Generation::Malformed("empty".to_string())),
        ]);
        let err = generate_brief(&api, &config, &format, &domestic, &world, "now")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert_eq!(api.prompts.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_falls_back_to_title_digests() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let api = Scripted::new(vec![Err(ApiError::fatal("HTTP 400"))]);
        let sender = Recording::default();

        let archive = brief_from_candidates(&api, &sender, &config, &format, &domestic, &world, "2025-01-07", None)
            .await
            .unwrap();

        assert_eq!(archive.fallback_sections, vec![DOMESTIC.to_string(), WORLD.to_string()]);
        assert!(archive.degraded);
        let sent = sender.sent.borrow();
        assert_eq!(sent.len(), 4);
        assert!(sent[0].text.starts_with("⚠️ 한국 주요뉴스 브리핑 실패:"));
        assert!(sent[0].text.contains("HTTP 400"));
        assert!(sent[1].text.contains("(제목만)"));
        assert!(sent[1].text.contains("1) Title A\nhttps://site.a/1"));
        assert!(sent[1].text.contains("2) Title D"));
        assert!(sent[2].text.starts_with("⚠️ 세계 경제 브리핑 실패:"));
        assert_eq!(sent[3].link.as_deref(), Some("https://site.c/1"));
    }

    #[tokio::test]
    async fn test_one_empty_section_only_falls_back_for_that_section() {
        let mut config = config();
        config.gemini.max_reprompts = 0;
        let format = BriefFormat::default();
        let (domestic, world) = sets();
        let text = format!(
            "{}\n### 1. Title A\n- x\nURL: https://site.a/1\n{}\n### 1. Made up\n- p\nURL: https://invented.example/1",
            format.domestic_marker, format.world_marker
        );
        let api = Scripted::new(vec![Scripted::text(&text)]);
        let sender = Recording::default();

        let archive = brief_from_candidates(&api, &sender, &config, &format, &domestic, &world, "d", None)
            .await
            .unwrap();

        assert_eq!(archive.domestic.len(), 1);
        assert_eq!(archive.fallback_sections, vec![WORLD.to_string()]);
        let sent = sender.sent.borrow();
        assert_eq!(sent.len(), 3);
        assert!(sent[1].text.contains(NO_MATCH_REASON));
    }

    #[tokio::test]
    async fn test_no_candidates_sends_nothing() {
        let config = config();
        let format = BriefFormat::default();
        let empty_domestic = set(DOMESTIC, "KR", &[]);
        let empty_world = set(WORLD, "WD", &[]);
        let api = Scripted::new(vec![]);
        let sender = Recording::default();

        let res = brief_from_candidates(&api, &sender, &config, &format, &empty_domestic, &empty_world, "d", None).await;
        assert!(res.is_err());
        assert!(api.prompts.borrow().is_empty());
        assert!(sender.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_empty_half_is_skipped_and_fails_the_run() {
        let config = config();
        let format = BriefFormat::default();
        let (domestic, _) = sets();
        let world = set(WORLD, "WD", &[]);
        let text = format!(
            "{}\n### 1. Title A\n- x\nURL: https://site.a/1\n{}\n",
            format.domestic_marker, format.world_marker
        );
        let api = Scripted::new(vec![Scripted::text(&text)]);
        let sender = Recording::default();

        let err = brief_from_candidates(&api, &sender, &config, &format, &domestic, &world, "d", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("world"));
        let sent = sender.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].link.as_deref(), Some("https://site.a/1"));
    }

    fn feed_item(title: &str, link: &str, date: &str) -> FeedItem {
        FeedItem {
            source: "연합뉴스".to_string(),
            title: title.to_string(),
            link: link.to_string(),
            guid: None,
            date: Some(date.to_string()),
        }
    }

    #[test]
    fn test_select_fresh() {
        let mut state = SentState::default();
        state.record("https://f/1", 1);
        let items = vec![
            feed_item("old news", "https://f/1", "2025-01-07T08:00:00+09:00"),
            feed_item("older", "https://f/2", "2025-01-06T08:00:00+09:00"),
            feed_item("newest", "https://f/3", "2025-01-07T09:00:00+09:00"),
            feed_item("dup", "https://f/3", "2025-01-07T09:00:00+09:00"),
            feed_item("", "", "2025-01-07T10:00:00+09:00"),
        ];
        let fresh = select_fresh(items, &state, 5);
        let titles: Vec<&str> = fresh.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["newest", "older"]);
        assert_eq!(select_fresh(fresh, &SentState::default(), 1).len(), 1);
    }

    #[tokio::test]
    async fn test_feeds_record_state_and_then_report_no_news() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state_econ.json");
        let state_path = state_path.to_str().unwrap();
        let items = vec![
            feed_item("a", "https://f/1", "2025-01-07T08:00:00+09:00"),
            feed_item("b", "https://f/2", "2025-01-07T09:00:00+09:00"),
        ];
        let sender = Recording::default();

        let sent = feeds_from_items(&sender, &config, items.clone(), state_path, "2025-01-07")
            .await
            .unwrap();
        assert_eq!(sent, 2);
        let state = SentState::load(state_path).await.unwrap();
        assert!(state.contains("https://f/1") && state.contains("https://f/2"));

        let again = feeds_from_items(&sender, &config, items, state_path, "2025-01-07")
            .await
            .unwrap();
        assert_eq!(again, 0);
        let sent = sender.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.starts_with("📈 2025-01-07 경제 뉴스 TOP 2"));
        assert!(sent[0].text.find("[연합뉴스] b").unwrap() < sent[0].text.find("[연합뉴스] a").unwrap());
        assert_eq!(sent[1].text, NO_NEWS_NOTICE);
    }

    #[tokio::test]
    async fn test_summarize_article() {
        let config = config();
        let article = Article {
            title: "t".to_string(),
            text: "본문".repeat(100),
        };
        let api = Scripted::new(vec![Scripted::text("- 첫째 문장\n\n둘째 문장")]);
        let lines = summarize_article(&api, &article, &config).await.unwrap();
        assert_eq!(lines, vec!["첫째 문장", "둘째 문장", "(요약 부족)"]);
        assert!(api.prompts.borrow()[0].contains(&"본문".repeat(100)));

        let empty = Article {
            title: "t".to_string(),
            text: String::new(),
        };
        let err = summarize_article(&api, &empty, &config).await.unwrap_err();
        assert_eq!(err.to_string(), EMPTY_BODY_REASON);
        assert_eq!(api.prompts.borrow().len(), 1);
    }

    #[test]
    fn test_summary_label() {
        assert_eq!(summary_label("economic", 10), "경제뉴스 TOP10");
        assert_eq!(summary_label("home", 7), "전체뉴스 TOP7");
    }

    #[test]
    fn test_parse_offline_uses_saved_candidates() {
        let format = BriefFormat::default();
        let candidates: CandidateFile = serde_json::from_str(
            r#"{"domestic": [{"title": "  Title   A ", "url": "https://site.a/1"}], "world": []}"#,
        )
        .unwrap();
        let text = brief_text(&format, "https://site.a/1");
        let archive = parse_offline(&text, candidates, &format, &Limits::default());
        assert_eq!(archive.domestic.len(), 1);
        assert!(archive.world.is_empty());
        assert!(!archive.degraded);
    }
}
