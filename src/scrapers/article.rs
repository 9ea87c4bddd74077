//! Article body extraction for the per-article summaries.
//!
//! News pages wrap the body in one of a handful of containers depending on
//! the outlet and page version; the first container holding enough text
//! wins. Inside it, paragraphs of at least [`MIN_PARAGRAPH_CHARS`] are kept,
//! which drops captions, bylines and share buttons.

use crate::config::SummarizeConfig;
use crate::http::HttpFetcher;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use tracing::{info, instrument};

pub const MIN_PARAGRAPH_CHARS: usize = 30;

const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "figure", "iframe"];

static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "div.article_view",
        "section#article",
        "div#article",
        "article",
        "div#kakaoContent",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("static selector"))
    .collect()
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));

/// Title and body text of one article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    /// Empty when no body of the configured minimum length was found.
    pub text: String,
}

/// Text of `el`, leaving out scripts, styles and embedded media.
fn visible_text(el: ElementRef<'_>) -> String {
    el.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
            });
            (!hidden).then(|| text.to_string())
        })
        .collect()
}

/// Collapse runs of spaces and tabs, and of blank lines.
fn clean_text(s: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank = 0;
    for line in s.replace('\u{a0}', " ").lines() {
        let line = line.split([' ', '\t']).filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank += 1;
            if blank > 1 {
                continue;
            }
        } else {
            blank = 0;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}

fn paragraphs<'a>(root: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
    root.map(|p| clean_text(&visible_text(p)))
        .filter(|t| t.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect()
}

/// Extract the article from a page. `text` is empty below `min_chars` and
/// cut at `max_chars` (with `...`) above.
pub fn extract_article(html: &str, min_chars: usize, max_chars: usize) -> Article {
    let document = Html::parse_document(html);

    let title = document
        .select(&OG_TITLE)
        .find_map(|m| m.value().attr("content"))
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| document.select(&TITLE).next().map(|t| t.text().collect()))
        .map(|t| clean_text(&t))
        .unwrap_or_default();

    let container = CONTAINERS.iter().find_map(|sel| {
        document
            .select(sel)
            .next()
            .filter(|el| visible_text(*el).trim().chars().count() > min_chars)
    });

    let text = match container {
        Some(el) => {
            let ps = paragraphs(el.select(&PARAGRAPH));
            if ps.is_empty() {
                clean_text(&visible_text(el))
            } else {
                ps.join("\n")
            }
        }
        None => paragraphs(document.select(&PARAGRAPH)).join("\n"),
    };

    let text = if text.chars().count() < min_chars {
        String::new()
    } else if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text
    };

    Article { title, text }
}

#[instrument(level = "info", skip(fetcher, config))]
pub async fn fetch_article(fetcher: &HttpFetcher, url: &str, config: &SummarizeConfig) -> Result<Article, Box<dyn Error>> {
    let html = fetcher.fetch_text(url).await?;
    let article = extract_article(&html, config.min_article_chars, config.max_article_chars);
    info!(chars = article.text.chars().count(), "Extracted article body");
    Ok(article)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(n: usize) -> String {
        format!("{n}번째 문장은 본문 추출 시험을 위해 충분히 길게 작성된 한국어 문장입니다.")
    }

    fn page(body: &str) -> String {
        format!(
            r#"<html><head><title>문서 제목 | 다음뉴스</title>
<meta property="og:title" content="기사 제목: 수출 회복세"></head>
<body><nav><p>메뉴</p></nav>{body}</body></html>"#
        )
    }

    #[test]
    fn test_extracts_paragraphs_from_first_container() {
        let body = format!(
            r#"<div class="article_view"><section>
<p>{}</p><p>사진 설명</p><p>{}</p><script>var x = "{}";</script><p>{}</p><p>{}</p>
</section></div>"#,
            sentence(1),
            sentence(2),
            sentence(99),
            sentence(3),
            sentence(4)
        );
        let article = extract_article(&page(&body), 100, 4500);
        assert_eq!(article.title, "기사 제목: 수출 회복세");
        assert_eq!(
            article.text,
            [sentence(1), sentence(2), sentence(3), sentence(4)].join("\n")
        );
    }

    #[test]
    fn test_container_without_paragraphs_uses_its_text() {
        let body = format!("<article>{}<br>{}</article>", sentence(1), sentence(2));
        let article = extract_article(&page(&body), 50, 4500);
        assert!(article.text.contains(&sentence(1)));
        assert!(article.text.contains(&sentence(2)));
    }

    #[test]
    fn test_short_body_is_empty() {
        let body = format!("<div id=\"article\"><p>{}</p></div>", sentence(1));
        let article = extract_article(&page(&body), 200, 4500);
        assert_eq!(article.text, "");
        assert_eq!(article.title, "기사 제목: 수출 회복세");
    }

    #[test]
    fn test_long_body_is_capped() {
        let body = format!(
            "<article>{}</article>",
            (1..=40).map(|i| format!("<p>{}</p>", sentence(i))).collect::<String>()
        );
        let article = extract_article(&page(&body), 200, 500);
        assert_eq!(article.text.chars().count(), 503);
        assert!(article.text.ends_with("..."));
    }

    #[test]
    fn test_title_falls_back_to_title_tag() {
        let html = "<html><head><title> 문서   제목 </title></head><body></body></html>";
        assert_eq!(extract_article(html, 200, 4500).title, "문서 제목");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a \t b \n\n\n\n c\u{a0}d "), "a b\n\nc d");
    }
}
