//! Relevance scoring, selection and outlining.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tracing::{info, warn};

use super::ModelCall;
use crate::error::PipelineError;
use crate::pipeline::engine::Stage;
use crate::pipeline::prompts;
use crate::pipeline::state::{
    Outline, OutlineArticle, OutlineSection, PipelineState, StageName, SummarizedItem,
};
use crate::schema::ValidatedRecord;

/// Scores items, keeps the relevant ones and asks for an outline.
pub struct CurateStage {
    call: ModelCall,
    min_score: f64,
    concurrency: usize,
}

impl CurateStage {
    pub fn new(call: ModelCall, min_score: f64, concurrency: usize) -> Self {
        Self {
            call,
            min_score,
            concurrency: concurrency.max(1),
        }
    }

    async fn score(&self, mut item: SummarizedItem) -> (SummarizedItem, Option<String>) {
        let validator = self.call.validator();
        let prompt = prompts::scoring(&item, validator.categories());
        match self.call.structured(&prompt, &validator.scoring_schema()).await {
            Ok(record) => {
                item.relevance_score = record.score("relevance_score");
                item.category = record.text("category").to_string();
                info!(
                    title = %item.title,
                    score = item.relevance_score,
                    category = %item.category,
                    "Scored item"
                );
                (item, None)
            }
            Err(e) => {
                warn!(title = %item.title, error = %e, "Scoring failed, forcing 0.0");
                item.relevance_score = 0.0;
                item.category = validator.default_category().to_string();
                let note = format!("scoring '{}': {}", item.title, e.label());
                (item, Some(note))
            }
        }
    }

    /// Items at or above the cut-off, best first, ties by title.
    fn select(&self, items: &[SummarizedItem]) -> Vec<SummarizedItem> {
        let mut selected: Vec<SummarizedItem> = items
            .iter()
            .filter(|i| i.relevance_score >= self.min_score)
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.title.cmp(&b.title))
        });
        selected
    }
}

fn as_article(item: &SummarizedItem) -> OutlineArticle {
    OutlineArticle {
        title: item.title.clone(),
        summary: item.summary.clone(),
        url: item.url.clone(),
        category: item.category.clone(),
    }
}

fn empty_outline() -> Outline {
    Outline {
        introduction_points: vec![
            "No significant news found this week. Please check back next time!".into(),
        ],
        conclusion_points: vec!["Stay tuned for more updates.".into()],
        overall_trends: vec!["Low news volume".into()],
        ..Outline::default()
    }
}

fn raw_articles_outline(articles: Vec<OutlineArticle>) -> Outline {
    Outline {
        introduction_points: vec![
            "An error occurred while generating the outline. Here's a raw list of articles."
                .into(),
        ],
        sections: vec![OutlineSection {
            name: "Raw Articles".into(),
            articles,
        }],
        conclusion_points: vec!["Please review the raw articles below.".into()],
        overall_trends: vec!["Error in outline generation".into()],
        ..Outline::default()
    }
}

fn critical_outline() -> Outline {
    Outline {
        introduction_points: vec![
            "A critical error occurred while generating the newsletter outline. Please check system logs."
                .into(),
        ],
        overall_trends: vec!["Critical outline generation failure".into()],
        ..Outline::default()
    }
}

/// Read a validated outline record into the domain type.
pub(crate) fn outline_from_record(record: &ValidatedRecord) -> Outline {
    Outline {
        date: None,
        introduction_points: record.list("introduction_points").to_vec(),
        sections: record
            .records("sections")
            .iter()
            .map(|section| OutlineSection {
                name: section.text("name").to_string(),
                articles: section
                    .records("articles")
                    .iter()
                    .map(|a| OutlineArticle {
                        title: a.text("title").to_string(),
                        summary: a.text("summary").to_string(),
                        url: a.text("url").to_string(),
                        category: a.text("category").to_string(),
                    })
                    .collect(),
            })
            .collect(),
        conclusion_points: record.list("conclusion_points").to_vec(),
        overall_trends: record.list("overall_trends").to_vec(),
    }
}

#[async_trait]
impl Stage for CurateStage {
    fn name(&self) -> StageName {
        StageName::Curate
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let items = std::mem::take(&mut state.summarized_items);
        info!(count = items.len(), concurrency = self.concurrency, "Scoring items");

        // `buffered` yields in input order, so the result matches a sequential pass.
        let scored: Vec<(SummarizedItem, Option<String>)> = futures::stream::iter(items)
            .map(|item| self.score(item))
            .buffered(self.concurrency)
            .collect()
            .await;
        for (item, note) in scored {
            if let Some(note) = note {
                state.note(StageName::Curate, note);
            }
            state.summarized_items.push(item);
        }

        let selected = self.select(&state.summarized_items);
        let today = Utc::now().date_naive();
        if selected.is_empty() {
            warn!(min_score = self.min_score, "No items met the relevance cut-off");
            state.note(StageName::Curate, "No items met the relevance cut-off.");
            state.outline = Outline {
                date: Some(today),
                ..empty_outline()
            };
            return state;
        }
        info!(selected = selected.len(), "Building outline");

        let articles: Vec<OutlineArticle> = selected.iter().map(as_article).collect();
        let validator = self.call.validator();
        let outline = match self
            .call
            .structured(&prompts::outline(&articles), &validator.outline_schema())
            .await
        {
            Ok(record) => {
                if record.duplicates_dropped() > 0 {
                    info!(dropped = record.duplicates_dropped(), "Dropped duplicate articles");
                }
                outline_from_record(&record)
            }
            Err(e @ PipelineError::InvocationError(_)) => {
                warn!(error = %e, "Outline invocation failed");
                state.note(StageName::Curate, format!("outline: {}", e.label()));
                critical_outline()
            }
            Err(e) => {
                warn!(error = %e, "Outline unusable, listing raw articles");
                state.note(StageName::Curate, format!("outline: {}", e.label()));
                raw_articles_outline(articles)
            }
        };
        state.outline = Outline {
            date: Some(today),
            ..outline
        };
        state
    }
}
