//! Google web search through serper.dev.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ItemSource, SourceKind, get_text};
use crate::error::SourceError;
use crate::pipeline::state::RawItem;

const SERPER_URL: &str = "https://google.serper.dev/search";
const NAME: &str = "serper";

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

pub struct SerperSource {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
}

impl SerperSource {
    pub fn new(client: reqwest::Client, api_key: SecretString) -> Self {
        Self {
            client,
            api_key,
            endpoint: SERPER_URL.to_string(),
        }
    }

    /// Point at a different search endpoint (a proxy or a local stub).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Map a serper.dev response body to items. Results without a link are dropped.
fn parse_results(body: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| SourceError::Parse {
        source_name: NAME.to_string(),
        reason: e.to_string(),
    })?;
    let fetched_at = Utc::now();
    Ok(response
        .organic
        .into_iter()
        .take(limit)
        .filter_map(|r| {
            let url = r.link.filter(|l| !l.trim().is_empty())?;
            Some(RawItem {
                title: r.title.unwrap_or_else(|| "No Title".to_string()),
                url,
                content: r.snippet.unwrap_or_else(|| "No Snippet".to_string()),
                source: "web_search".to_string(),
                fetched_at,
            })
        })
        .collect())
}

#[async_trait]
impl ItemSource for SerperSource {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::WebSearch
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        debug!(query, limit, "Web search");
        let request = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", self.api_key.expose_secret())
            .json(&serde_json::json!({ "q": query, "num": limit }));
        let body = get_text(NAME, request).await?;
        let items = parse_results(&body, limit)?;
        info!(query, count = items.len(), "Web search complete");
        Ok(items)
    }
}
