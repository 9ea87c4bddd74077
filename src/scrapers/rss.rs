//! Minimal RSS 2.0 reader.
//!
//! Only the fields the pipelines use are read from each `<item>`: `title`,
//! `link`, `guid` and `pubDate` (or `dc:date`). Text and CDATA are both
//! accepted; entity references are resolved.

use crate::config::FeedSource;
use crate::http::HttpFetcher;
use crate::models::FeedItem;
use crate::brief::normalize::normalize_whitespace;
use chrono::{DateTime, FixedOffset};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use std::error::Error;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    Date,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"guid" => Some(Self::Guid),
            b"pubDate" | b"dc:date" => Some(Self::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ItemBuf {
    title: String,
    link: String,
    guid: String,
    date: String,
}

impl ItemBuf {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Guid => &mut self.guid,
            Field::Date => &mut self.date,
        };
        target.push_str(text);
    }

    fn finish(self, source: &str) -> Option<FeedItem> {
        let title = normalize_whitespace(&self.title);
        let link = self.link.trim().to_string();
        if title.is_empty() && link.is_empty() {
            return None;
        }
        let guid = Some(self.guid.trim().to_string()).filter(|g| !g.is_empty());
        let date = parse_date(&self.date).map(|d| d.to_rfc3339());
        Some(FeedItem {
            source: source.to_string(),
            title,
            link,
            guid,
            date,
        })
    }
}

/// Parse an RFC 2822 (`pubDate`) or RFC 3339 (`dc:date`) timestamp.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Parse every `<item>` of an RSS document, in document order.
pub fn parse_feed(xml: &str, source: &str) -> Result<Vec<FeedItem>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);

    let mut items = Vec::new();
    let mut current: Option<ItemBuf> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if name.as_ref() == b"item" {
                    current = Some(ItemBuf::default());
                    field = None;
                } else if current.is_some() {
                    field = Field::from_tag(name.as_ref());
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take().and_then(|buf| buf.finish(source)) {
                        items.push(item);
                    }
                }
                field = None;
            }
            Event::Text(e) => {
                if let (Some(buf), Some(f)) = (current.as_mut(), field) {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    let text = unescape(&raw).map(|t| t.into_owned()).unwrap_or_else(|_| raw.into_owned());
                    buf.push(f, &text);
                }
            }
            Event::GeneralRef(e) => {
                if let (Some(buf), Some(f)) = (current.as_mut(), field) {
                    let entity = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                    if let Ok(text) = unescape(&entity) {
                        buf.push(f, &text);
                    }
                }
            }
            Event::CData(e) => {
                if let (Some(buf), Some(f)) = (current.as_mut(), field) {
                    buf.push(f, &String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

/// Newest first; entries without a parseable date go last, in feed order.
pub fn sort_newest_first(items: &mut [FeedItem]) {
    items.sort_by_key(|item| {
        std::cmp::Reverse(
            item.date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.timestamp_millis())
                .unwrap_or(i64::MIN),
        )
    });
}

#[instrument(level = "info", skip(fetcher), fields(source = %source.name))]
pub async fn fetch_feed(fetcher: &HttpFetcher, source: &FeedSource) -> Result<Vec<FeedItem>, Box<dyn Error>> {
    let xml = fetcher.fetch_text(&source.url).await?;
    let items = parse_feed(&xml, &source.name)?;
    info!(count = items.len(), "Parsed RSS feed");
    Ok(items)
}
