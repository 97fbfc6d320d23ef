//! arXiv search through the export API.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::feed::parse_feed;
use super::{ItemSource, SourceKind, get_text};
use crate::error::SourceError;
use crate::pipeline::state::RawItem;

const ARXIV_URL: &str = "http://export.arxiv.org/api/query";
const NAME: &str = "arxiv";

/// Newest papers first.
pub struct ArxivSource {
    client: reqwest::Client,
    endpoint: String,
}

impl ArxivSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: ARXIV_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn to_items(xml: &str) -> Result<Vec<RawItem>, SourceError> {
    let entries = parse_feed(xml).map_err(|reason| SourceError::Parse {
        source_name: NAME.to_string(),
        reason,
    })?;
    let fetched_at = Utc::now();
    Ok(entries
        .into_iter()
        .filter(|e| !e.link.is_empty())
        .map(|e| RawItem {
            title: if e.title.is_empty() {
                "No Title".to_string()
            } else {
                e.title
            },
            url: e.link,
            content: if e.summary.is_empty() {
                "No Summary".to_string()
            } else {
                e.summary
            },
            source: "arxiv_paper".to_string(),
            fetched_at,
        })
        .collect())
}

#[async_trait]
impl ItemSource for ArxivSource {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Academic
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        debug!(query, limit, "arXiv search");
        let search_query = format!("all:{query}");
        let max_results = limit.to_string();
        let request = self.client.get(&self.endpoint).query(&[
            ("search_query", search_query.as_str()),
            ("max_results", max_results.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
        ]);
        let body = get_text(NAME, request).await?;
        let mut items = to_items(&body)?;
        items.truncate(limit);
        info!(query, count = items.len(), "arXiv search complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_map_to_papers() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
          <entry>
            <title>Multi-Agent Debate</title>
            <summary>  Agents argue.  </summary>
            <link href="http://arxiv.org/abs/1" rel="alternate"/>
          </entry>
          <entry>
            <title>No link</title>
          </entry>
        </feed>"#;
        let items = to_items(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "http://arxiv.org/abs/1");
        assert_eq!(items[0].content, "Agents argue.");
        assert_eq!(items[0].source, "arxiv_paper");
    }
}
