//! RSS 2.0 and Atom feeds.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::{debug, info};

use super::{ItemSource, SourceKind, get_text};
use crate::error::SourceError;
use crate::pipeline::state::RawItem;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// One `<item>` or `<entry>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Description or summary, falling back to full content. Markup removed.
    pub summary: String,
    pub published: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
    Content,
    Published,
}

impl Field {
    fn from_tag(local: &[u8]) -> Option<Self> {
        match local {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"description" | b"summary" => Some(Self::Summary),
            b"encoded" | b"content" => Some(Self::Content),
            b"pubDate" | b"published" | b"updated" => Some(Self::Published),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Partial {
    entry: FeedEntry,
    content: String,
    alternate: bool,
    published_closed: bool,
}

impl Partial {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.entry.title,
            Field::Link => &mut self.entry.link,
            Field::Summary => &mut self.entry.summary,
            Field::Content => &mut self.content,
            Field::Published if self.published_closed => return,
            Field::Published => self.entry.published.get_or_insert_with(String::new),
        };
        target.push_str(text);
    }

    /// Atom `<link href=.. rel=..>`. The `alternate` link wins.
    fn atom_link(&mut self, tag: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in tag.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        let Some(href) = href else { return };
        let alternate = rel.as_deref().is_none_or(|r| r == "alternate");
        if self.entry.link.is_empty() || (alternate && !self.alternate) {
            self.entry.link = href;
            self.alternate = alternate;
        }
    }

    fn finish(mut self) -> FeedEntry {
        if self.entry.summary.trim().is_empty() {
            self.entry.summary = self.content;
        }
        self.entry.title = plain_text(&self.entry.title);
        self.entry.link = self.entry.link.trim().to_string();
        self.entry.summary = plain_text(&self.entry.summary);
        self.entry.published = self
            .entry
            .published
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self.entry
    }
}

/// Drop markup, decode the common HTML entities and collapse whitespace.
fn plain_text(html: &str) -> String {
    let stripped = TAG.replace_all(html, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    SPACE.replace_all(decoded.trim(), " ").into_owned()
}

/// Parse an RSS or Atom document into entries, in document order.
///
/// Channel-level elements are ignored. Only entries are returned.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<Partial> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(tag) => {
                let local = tag.local_name();
                match local.as_ref() {
                    b"item" | b"entry" => {
                        current = Some(Partial::default());
                        field = None;
                    }
                    b"link" if current.is_some() && has_href(&tag) => {
                        if let Some(partial) = current.as_mut() {
                            partial.atom_link(&tag);
                        }
                    }
                    name if current.is_some() && field.is_none() => {
                        field = Field::from_tag(name);
                    }
                    _ => {}
                }
            }
            Event::Empty(tag) => {
                if tag.local_name().as_ref() == b"link"
                    && let Some(partial) = current.as_mut()
                {
                    partial.atom_link(&tag);
                }
            }
            Event::Text(text) => {
                if let (Some(partial), Some(f)) = (current.as_mut(), field) {
                    let value = text
                        .unescape()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(text.as_ref()).into_owned());
                    partial.push(f, &value);
                }
            }
            Event::CData(data) => {
                if let (Some(partial), Some(f)) = (current.as_mut(), field) {
                    partial.push(f, &String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(tag) => {
                let local = tag.local_name();
                match local.as_ref() {
                    b"item" | b"entry" => {
                        if let Some(partial) = current.take() {
                            entries.push(partial.finish());
                        }
                        field = None;
                    }
                    name if field.is_some() && Field::from_tag(name) == field => {
                        if field == Some(Field::Published)
                            && let Some(partial) = current.as_mut()
                        {
                            partial.published_closed = true;
                        }
                        field = None;
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

fn has_href(tag: &BytesStart<'_>) -> bool {
    tag.attributes()
        .flatten()
        .any(|a| a.key.local_name().as_ref() == b"href")
}

/// A single RSS or Atom feed URL.
pub struct FeedSource {
    client: reqwest::Client,
    url: String,
}

impl FeedSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ItemSource for FeedSource {
    fn name(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }

    async fn fetch(&self, _query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        debug!(url = %self.url, limit, "Fetching feed");
        let body = get_text(&self.url, self.client.get(&self.url)).await?;
        let entries = parse_feed(&body).map_err(|reason| SourceError::Parse {
            source_name: self.url.clone(),
            reason,
        })?;

        let fetched_at = Utc::now();
        let items: Vec<RawItem> = entries
            .into_iter()
            .filter(|e| !e.link.is_empty())
            .take(limit)
            .map(|e| RawItem {
                title: if e.title.is_empty() {
                    "No Title".to_string()
                } else {
                    e.title
                },
                url: e.link,
                content: e.summary,
                source: "rss_feed".to_string(),
                fetched_at,
            })
            .collect();
        info!(url = %self.url, count = items.len(), "Feed parsed");
        Ok(items)
    }
}
