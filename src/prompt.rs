//! Prompts sent to the generative API.
//!
//! The brief prompt pins the output format the parser in [`crate::brief`]
//! expects and lists every candidate with its exact URL; the generator is
//! told to pick only from that list.

use crate::config::{BriefConfig, Limits};
use crate::models::CandidateSet;

/// Render one section's candidates.
///
/// ```text
/// [한국 후보]
/// 1) 제목
/// URL: https://...
/// ```
///
/// With `use_ids` the number is replaced by the candidate's identifier
/// (`KR-01 | 제목`).
pub fn candidates_block(label: &str, set: &CandidateSet, use_ids: bool) -> String {
    let mut lines = vec![format!("[{label}]")];
    for (i, c) in set.candidates.iter().enumerate() {
        if use_ids {
            lines.push(format!("{} | {}", c.id, c.link.title));
        } else {
            lines.push(format!("{}) {}", i + 1, c.link.title));
        }
        lines.push(format!("URL: {}", c.link.url));
        lines.push(String::new());
    }
    lines.join("\n").trim().to_string()
}

fn format_section(brief: &BriefConfig, marker: &str, limit: usize, id_prefix: &str) -> String {
    let mut lines = vec![format!("{marker} TOP{limit}==")];
    if brief.use_ids {
        lines.push(format!("{} 1. ID: {id_prefix}-01 | 제목", brief.heading_token));
    } else {
        lines.push(format!("{} 1. 제목", brief.heading_token));
    }
    for i in 1..=brief.max_bullets {
        lines.push(format!("- 객관요약{i}"));
    }
    if brief.include_conclusion {
        lines.push(format!("{}: ...", brief.conclusion_label));
    }
    lines.push("URL: https://...".to_string());
    lines.push(String::new());
    lines.push(format!("(반드시 {limit}개)"));
    lines.join("\n")
}

/// The full brief prompt: rules, output format and both candidate lists.
pub fn brief_prompt(
    brief: &BriefConfig,
    limits: &Limits,
    brand: &str,
    now_kst: &str,
    domestic: &CandidateSet,
    world: &CandidateSet,
) -> String {
    let id_rule = if brief.use_ids {
        "- 제목 줄에는 후보의 ID를 그대로 적어라. (예: ID: KR-03 | 제목)\n"
    } else {
        ""
    };
    let conclusion_rule = if brief.include_conclusion {
        format!(
            "- 각 항목은 \"객관 요약 {}줄\" + \"{}(중립 코멘트 1문장)\"을 포함한다.\n",
            brief.max_bullets, brief.conclusion_label
        )
    } else {
        format!("- 각 항목은 \"객관 요약 {}줄\"을 포함한다.\n", brief.max_bullets)
    };

    format!(
        "너는 \"{brand}\" 뉴스 브리핑 작성자다.\n\
현재 시각은 {now_kst} 이다.\n\
너는 웹을 탐색하지 않는다. 아래 [기사 후보 목록]에 있는 기사만 골라서 브리핑을 작성하라.\n\
\n\
[목표]\n\
1) 한국 주요 뉴스 TOP{kr}\n\
2) 세계 경제 주요 뉴스 TOP{wd}\n\
\n\
[규칙 - 매우 중요]\n\
- 반드시 아래 출력 포맷을 100% 지켜라. (형식이 깨지면 전송이 실패한다)\n\
{conclusion_rule}\
- 각 항목은 반드시 \"URL: https://...\" 라인을 포함해야 한다. (URL 라인이 없으면 그 항목은 무효)\n\
- URL은 후보 목록의 URL 전체를 한 글자도 바꾸지 말고 그대로 복사하라. 도메인만 쓰거나 새 링크를 만들면 그 항목은 버려진다.\n\
{id_rule}\
- 감정적 표현/선동/확신 단정 금지. 숫자/사실 기반으로.\n\
- 불필요한 서론/설명/코드블록/마크다운 추가 금지. 오직 아래 포맷만 출력.\n\
\n\
[출력 끊김 방지]\n\
- TOP{kr}과 TOP{wd}를 모두 출력할 때까지 멈추지 마라.\n\
- 응답이 길면 요약 문장을 더 짧게 해서라도 \"개수\"와 \"URL 라인\"을 반드시 지켜라.\n\
\n\
[출력 포맷] (절대 깨지면 안됨)\n\
{domestic_format}\n\
\n\
{world_format}\n\
\n\
[기사 후보 목록]\n\
{domestic_block}\n\
\n\
{world_block}",
        kr = limits.domestic,
        wd = limits.world,
        domestic_format = format_section(brief, &brief.domestic_marker, limits.domestic, &domestic.id_prefix),
        world_format = format_section(brief, &brief.world_marker, limits.world, &world.id_prefix),
        domestic_block = candidates_block("한국 후보", domestic, brief.use_ids),
        world_block = candidates_block("세계경제 후보", world, brief.use_ids),
    )
}

/// What went wrong with the previous attempt, for the re-prompt note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryIssues {
    /// A section marker was missing.
    pub degraded: bool,
    /// Names of sections that produced no item at all.
    pub empty_sections: Vec<String>,
    /// Items dropped because their URL was not a candidate.
    pub rejected_urls: usize,
}

impl RetryIssues {
    pub fn is_clean(&self) -> bool {
        !self.degraded && self.empty_sections.is_empty() && self.rejected_urls == 0
    }
}

/// Note appended to the original prompt when re-prompting.
pub fn retry_note(issues: &RetryIssues, brief: &BriefConfig) -> String {
    let mut lines = vec!["[이전 응답의 문제 - 반드시 고쳐라]".to_string()];
    if issues.degraded {
        lines.push(format!(
            "- 섹션 제목 줄(\"{}\", \"{}\")이 빠져 있었다. 두 섹션 제목을 포맷 그대로 출력하라.",
            brief.domestic_marker, brief.world_marker
        ));
    }
    for section in &issues.empty_sections {
        lines.push(format!(
            "- {section} 섹션에서 읽을 수 있는 항목이 하나도 없었다. \"{} 1. 제목\" 형식을 지켜라.",
            brief.heading_token
        ));
    }
    if issues.rejected_urls > 0 {
        lines.push(format!(
            "- 이전 출력에 후보 목록에 없는 URL이 {}개 있었다. 링크를 지어내지 말고 후보 URL을 그대로 복사하라.",
            issues.rejected_urls
        ));
    }
    lines.join("\n")
}

/// Per-article summary prompt asking for exactly `lines` lines.
pub fn summary_prompt(article_text: &str, lines: usize) -> String {
    format!(
        "너는 경제/시사 뉴스 요약가다.\n\
아래 기사 본문을 한국어로 \"{lines}줄\"로만 요약해라.\n\
- 각 줄은 한 문장\n\
- 수치/지표(%, 원, 달러, 금리, 지수)가 있으면 최대한 포함\n\
- 불필요한 서론/감정/의견 금지\n\
- 출력 형식은 정확히 {lines}줄(불릿/번호 없이 줄바꿈만)\n\
\n\
[기사 본문]\n\
{article_text}"
    )
}

/// Force a summary reply into exactly `lines` lines, padding with a marker
/// when the generator returned fewer.
pub fn fit_summary_lines(reply: &str, lines: usize) -> Vec<String> {
    let mut out: Vec<String> = reply
        .lines()
        .map(|l| l.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|l| !l.is_empty())
        .take(lines)
        .map(str::to_string)
        .collect();
    while out.len() < lines {
        out.push("(요약 부족)".to_string());
    }
    out
}
