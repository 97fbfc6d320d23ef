//! The state record threaded through every stage, and the domain records it
//! holds.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quality::Verdict;

// ── Stage names ─────────────────────────────────────────────────────

/// The fixed set of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Fetch,
    Distill,
    Curate,
    Produce,
    Review,
    Deliver,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Distill => "distill",
            Self::Curate => "curate",
            Self::Produce => "produce",
            Self::Review => "review",
            Self::Deliver => "deliver",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Source material ─────────────────────────────────────────────────

/// An item as fetched from a source, before any model processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub title: String,
    pub url: String,
    /// Article body, snippet or abstract.
    pub content: String,
    /// Source tag: "web_search", "rss_feed", "arxiv_paper", ...
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// A source item after distillation and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizedItem {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub key_entities: Vec<String>,
    pub trends: Vec<String>,
    pub relevance_score: f64,
    pub category: String,
}

// ── Outline ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineArticle {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub name: String,
    pub articles: Vec<OutlineArticle>,
}

/// Structure of the digest, produced by curation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub date: Option<NaiveDate>,
    pub introduction_points: Vec<String>,
    pub sections: Vec<OutlineSection>,
    pub conclusion_points: Vec<String>,
    pub overall_trends: Vec<String>,
}

impl Outline {
    pub fn article_count(&self) -> usize {
        self.sections.iter().map(|s| s.articles.len()).sum()
    }
}

// ── Draft ───────────────────────────────────────────────────────────

/// A single problem the reviewer found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// The produced artifact and its latest review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub date: Option<NaiveDate>,
    pub subject: String,
    pub content_markdown: String,
    pub content_html: String,
    pub approval_score: f64,
    pub feedback: String,
    pub issues: Vec<ReviewIssue>,
    /// Revision attempts spent when this draft was produced.
    pub revision_attempts: u32,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.content_markdown.trim().is_empty()
    }
}

// ── Delivery ────────────────────────────────────────────────────────

/// Terminal delivery metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub sent: bool,
    pub report: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub archived: Vec<PathBuf>,
}

/// An advisory note left by a stage that had to degrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNote {
    pub stage: StageName,
    pub message: String,
}

// ── Pipeline state ──────────────────────────────────────────────────

/// How a finished run ended, read off the state's own fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Approved and sent.
    Shipped,
    /// Approved but not sent.
    ShippedDegraded,
    /// Not approved.
    Rejected,
}

/// The single record threaded through all stages.
///
/// Every field always holds a well-formed value. A stage that cannot do its
/// work replaces its field with a fallback and appends a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub recipients: Vec<String>,
    pub source_items: Vec<RawItem>,
    pub summarized_items: Vec<SummarizedItem>,
    pub outline: Outline,
    pub draft: Draft,
    pub approved: bool,
    pub revision_attempts: u32,
    /// Verdict of the most recent review, if any.
    pub verdict: Option<Verdict>,
    pub delivery: Delivery,
    pub notes: Vec<StageNote>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PipelineState {
    /// Fresh state for a new run.
    pub fn new(recipients: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            recipients,
            source_items: Vec::new(),
            summarized_items: Vec::new(),
            outline: Outline::default(),
            draft: Draft::default(),
            approved: false,
            revision_attempts: 0,
            verdict: None,
            delivery: Delivery::default(),
            notes: Vec::new(),
        }
    }

    /// Record an advisory note.
    pub fn note(&mut self, stage: StageName, message: impl Into<String>) {
        self.notes.push(StageNote {
            stage,
            message: message.into(),
        });
    }

    pub fn notes_for(&self, stage: StageName) -> impl Iterator<Item = &StageNote> {
        self.notes.iter().filter(move |n| n.stage == stage)
    }

    pub fn outcome(&self) -> RunOutcome {
        match (self.approved, self.delivery.sent) {
            (true, true) => RunOutcome::Shipped,
            (true, false) => RunOutcome::ShippedDegraded,
            (false, _) => RunOutcome::Rejected,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> PipelineState {
        let mut state = PipelineState::new(vec!["reader@example.com".into()]);
        state.source_items.push(RawItem {
            title: "LangGraph adds cycles".into(),
            url: "https://example.com/a".into(),
            content: "Cycles and memory.".into(),
            source: "rss_feed".into(),
            fetched_at: Utc::now(),
        });
        state.summarized_items.push(SummarizedItem {
            url: "https://example.com/a".into(),
            title: "LangGraph adds cycles".into(),
            summary: "Cycles.".into(),
            key_entities: vec!["LangGraph".into()],
            trends: vec!["agent loops".into()],
            relevance_score: 0.1 + 0.2,
            category: "New Frameworks & Tools".into(),
        });
        state.outline = Outline {
            date: NaiveDate::from_ymd_opt(2026, 10, 16),
            introduction_points: vec!["Intro".into()],
            sections: vec![OutlineSection {
                name: "Tools".into(),
                articles: vec![OutlineArticle {
                    title: "LangGraph adds cycles".into(),
                    summary: "Cycles.".into(),
                    url: "https://example.com/a".into(),
                    category: "New Frameworks & Tools".into(),
                }],
            }],
            conclusion_points: vec![],
            overall_trends: vec!["loops".into()],
        };
        state.draft = Draft {
            date: NaiveDate::from_ymd_opt(2026, 10, 16),
            subject: "AI Agent Weekly Digest: loops".into(),
            content_markdown: "## Intro".into(),
            content_html: "<h2>Intro</h2>".into(),
            approval_score: 0.83,
            feedback: "Approved.".into(),
            issues: vec![ReviewIssue {
                kind: "Style".into(),
                description: "Long intro".into(),
            }],
            revision_attempts: 1,
        };
        state.approved = true;
        state.revision_attempts = 1;
        state.verdict = Some(Verdict::Approved);
        state.delivery = Delivery {
            sent: true,
            report: "Sent.".into(),
            sent_at: Some(Utc::now()),
            archived: vec![PathBuf::from("/tmp/a.md")],
        };
        state.note(StageName::Fetch, "feed down");
        state
    }

    #[test]
    fn json_round_trip_preserves_every_field() {
        let state = populated();
        let json = state.to_json().unwrap();
        let back = PipelineState::from_json(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn serialized_keys_match_field_names() {
        let value = serde_json::to_value(populated()).unwrap();
        for key in [
            "run_id",
            "started_at",
            "source_items",
            "summarized_items",
            "outline",
            "draft",
            "approved",
            "revision_attempts",
            "delivery",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["draft"]["issues"][0]["type"], "Style");
        assert_eq!(value["notes"][0]["stage"], "fetch");
        assert!(value["started_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn outcome_reads_approved_and_sent() {
        let mut state = populated();
        assert_eq!(state.outcome(), RunOutcome::Shipped);
        state.delivery.sent = false;
        assert_eq!(state.outcome(), RunOutcome::ShippedDegraded);
        state.approved = false;
        assert_eq!(state.outcome(), RunOutcome::Rejected);
    }

    #[test]
    fn fresh_state_is_well_formed() {
        let state = PipelineState::default();
        assert!(state.draft.is_empty());
        assert_eq!(state.outline.article_count(), 0);
        assert_eq!(state.outcome(), RunOutcome::Rejected);
        assert_eq!(state.notes_for(StageName::Fetch).count(), 0);
    }
}
