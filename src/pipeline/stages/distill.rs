//! Per-item summaries, key entities and trends.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{ModelCall, truncate_chars};
use crate::error::PipelineError;
use crate::pipeline::engine::Stage;
use crate::pipeline::prompts;
use crate::pipeline::state::{PipelineState, RawItem, StageName, SummarizedItem};

const PARSE_FAILED: &str = "Could not process article (JSON parsing failed).";
const INVOCATION_FAILED: &str = "Failed to summarize due to LLM invocation error.";

/// Summarizes each source item and extracts entities and trends.
pub struct DistillStage {
    call: ModelCall,
    max_summary_len: usize,
    max_chunk: usize,
}

impl DistillStage {
    pub fn new(call: ModelCall, max_summary_len: usize, max_chunk: usize) -> Self {
        Self {
            call,
            max_summary_len,
            max_chunk,
        }
    }

    /// Distilled item, plus a note when the model could not be used.
    async fn distill(&self, item: &RawItem) -> (SummarizedItem, Option<String>) {
        let validator = self.call.validator();
        let mut distilled = SummarizedItem {
            url: item.url.trim().to_string(),
            title: item.title.trim().to_string(),
            summary: String::new(),
            key_entities: Vec::new(),
            trends: Vec::new(),
            relevance_score: 0.0,
            category: validator.default_category().to_string(),
        };

        let prompt = prompts::extraction(item, self.max_summary_len, self.max_chunk);
        let note = match self.call.structured(&prompt, &validator.extraction_schema()).await {
            Ok(record) => {
                distilled.summary = self.fit_summary(&item.title, record.text("summary")).await;
                distilled.key_entities = record.list("key_entities").to_vec();
                distilled.trends = record.list("trends_identified").to_vec();
                None
            }
            Err(e @ PipelineError::InvocationError(_)) => {
                warn!(title = %item.title, error = %e, "Distill invocation failed");
                distilled.summary = INVOCATION_FAILED.to_string();
                Some(format!("{}: {}", item.title, e.label()))
            }
            Err(e) => {
                warn!(title = %item.title, error = %e, "Distill output unusable, using article text");
                distilled.summary = if item.content.trim().is_empty() {
                    PARSE_FAILED.to_string()
                } else {
                    truncate_chars(item.content.trim(), self.max_summary_len).to_string()
                };
                Some(format!("{}: {}", item.title, e.label()))
            }
        };
        (distilled, note)
    }

    /// Keep a summary within `max_summary_len`: ask once for a shorter one,
    /// then cut and append `...`.
    async fn fit_summary(&self, title: &str, summary: &str) -> String {
        if summary.chars().count() <= self.max_summary_len {
            return summary.to_string();
        }
        warn!(title, chars = summary.chars().count(), "Summary too long, re-summarizing");
        let shorter = match self
            .call
            .text(&prompts::resummarize(summary, self.max_summary_len))
            .await
        {
            Ok(text) => text.trim().trim_matches(['"', '\'']).trim().to_string(),
            Err(e) => {
                warn!(title, error = %e, "Re-summarize failed");
                summary.to_string()
            }
        };
        if shorter.chars().count() <= self.max_summary_len && !shorter.is_empty() {
            return shorter;
        }
        let keep = self.max_summary_len.saturating_sub(3);
        format!("{}...", truncate_chars(&shorter, keep))
    }
}

#[async_trait]
impl Stage for DistillStage {
    fn name(&self) -> StageName {
        StageName::Distill
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let total = state.source_items.len();
        let mut distilled = Vec::with_capacity(total);
        let mut notes = Vec::new();
        for (i, item) in state.source_items.iter().enumerate() {
            info!(index = i + 1, total, title = %item.title, "Distilling item");
            let (summarized, note) = self.distill(item).await;
            distilled.push(summarized);
            notes.extend(note);
        }
        for note in notes {
            state.note(StageName::Distill, note);
        }
        state.summarized_items = distilled;
        state
    }
}
