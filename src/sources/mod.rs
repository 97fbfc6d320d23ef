//! Item sources: web search, syndication feeds, arXiv, and fixed lists.
//!
//! Sources are pure I/O. Budgeting, de-duplication and failure handling live
//! in the fetch stage.

mod arxiv;
mod feed;
mod fixed;
mod serper;

pub use arxiv::ArxivSource;
pub use feed::{FeedEntry, FeedSource, parse_feed};
pub use fixed::StaticSource;
pub use serper::SerperSource;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ResearchConfig;
use crate::error::SourceError;
use crate::pipeline::state::RawItem;

/// How a source is queried and budgeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Queried once per keyword.
    WebSearch,
    /// Fetched once per run; the query is ignored.
    Feed,
    /// Queried once per keyword with half the web budget.
    Academic,
}

/// Something that can produce raw items.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Name for logs and notes.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Fetch at most `limit` items for `query`.
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError>;
}

/// Build the configured sources in fetch order: web search, feeds, arXiv.
pub fn from_config(config: &ResearchConfig) -> Vec<Arc<dyn ItemSource>> {
    let client = reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .user_agent(concat!("ai-digest/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default();

    let mut sources: Vec<Arc<dyn ItemSource>> = Vec::new();
    match &config.serper_api_key {
        Some(key) => sources.push(Arc::new(SerperSource::new(client.clone(), key.clone()))),
        None => tracing::warn!("SERPER_API_KEY not set, web search disabled"),
    }
    for url in &config.feeds {
        sources.push(Arc::new(FeedSource::new(client.clone(), url)));
    }
    if config.arxiv {
        sources.push(Arc::new(ArxivSource::new(client)));
    }
    sources
}

fn request_failed(source_name: &str, e: reqwest::Error) -> SourceError {
    SourceError::RequestFailed {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    }
}

async fn get_text(
    source_name: &str,
    request: reqwest::RequestBuilder,
) -> Result<String, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| request_failed(source_name, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::BadStatus {
            source_name: source_name.to_string(),
            status: status.as_u16(),
        });
    }
    response
        .text()
        .await
        .map_err(|e| request_failed(source_name, e))
}
