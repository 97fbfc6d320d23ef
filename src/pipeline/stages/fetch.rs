//! Source collection with an item budget and URL de-duplication.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::pipeline::engine::Stage;
use crate::pipeline::state::{PipelineState, RawItem, StageName};
use crate::sources::{ItemSource, SourceKind};

/// Gathers source items: web search first, then feeds, then arXiv.
pub struct FetchStage {
    sources: Vec<Arc<dyn ItemSource>>,
    keywords: Vec<String>,
    max_items: usize,
}

impl FetchStage {
    pub fn new(sources: Vec<Arc<dyn ItemSource>>, keywords: Vec<String>, max_items: usize) -> Self {
        Self {
            sources,
            keywords,
            max_items,
        }
    }

    fn rank(kind: SourceKind) -> u8 {
        match kind {
            SourceKind::WebSearch => 0,
            SourceKind::Feed => 1,
            SourceKind::Academic => 2,
        }
    }

    /// `(query, limit)` pairs for one source. Every limit is at least one.
    fn queries(&self, kind: SourceKind, feed_count: usize) -> Vec<(String, usize)> {
        let per_keyword = (self.max_items / self.keywords.len().max(1)).max(1);
        match kind {
            SourceKind::WebSearch => self
                .keywords
                .iter()
                .map(|k| (k.clone(), per_keyword))
                .collect(),
            SourceKind::Feed => {
                vec![(String::new(), (self.max_items / feed_count.max(1)).max(1))]
            }
            SourceKind::Academic => {
                let limit = (self.max_items / self.keywords.len().max(1) / 2).max(1);
                self.keywords.iter().map(|k| (k.clone(), limit)).collect()
            }
        }
    }
}

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> StageName {
        StageName::Fetch
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let mut ordered: Vec<&Arc<dyn ItemSource>> = self.sources.iter().collect();
        ordered.sort_by_key(|s| Self::rank(s.kind()));
        let feed_count = ordered
            .iter()
            .filter(|s| s.kind() == SourceKind::Feed)
            .count();

        let mut seen = HashSet::new();
        let mut items: Vec<RawItem> = Vec::new();
        for source in ordered {
            for (query, limit) in self.queries(source.kind(), feed_count) {
                match source.fetch(&query, limit).await {
                    Ok(fetched) => {
                        for item in fetched {
                            if !item.url.is_empty() && seen.insert(item.url.clone()) {
                                items.push(item);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(source = source.name(), query = %query, error = %e, "Source failed");
                        state.note(StageName::Fetch, format!("{}: {e}", source.name()));
                    }
                }
            }
        }

        items.truncate(self.max_items);
        info!(count = items.len(), "Fetched unique source items");
        if items.is_empty() {
            state.note(StageName::Fetch, "No source items fetched.");
        }
        state.source_items = items;
        state
    }
}
