//! Editorial review of the draft, judged by the quality gate.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{info, warn};

use super::ModelCall;
use crate::pipeline::engine::Stage;
use crate::pipeline::prompts;
use crate::pipeline::state::{PipelineState, ReviewIssue, StageName, SummarizedItem};
use crate::quality::{QualityGate, Verdict};

const REVIEW_FAILED: &str =
    "Critical internal error during editorial review. Manual intervention required.";

/// Scores the draft and applies the quality gate.
pub struct ReviewStage {
    call: ModelCall,
    gate: QualityGate,
}

impl ReviewStage {
    pub fn new(call: ModelCall, gate: QualityGate) -> Self {
        Self { call, gate }
    }
}

/// Summaries of the articles the outline kept, or all of them when the
/// outline references none.
fn fact_sources(state: &PipelineState) -> Vec<SummarizedItem> {
    let urls: HashSet<&str> = state
        .outline
        .sections
        .iter()
        .flat_map(|s| s.articles.iter().map(|a| a.url.as_str()))
        .collect();
    let kept: Vec<SummarizedItem> = state
        .summarized_items
        .iter()
        .filter(|i| urls.contains(i.url.as_str()))
        .cloned()
        .collect();
    if kept.is_empty() {
        state.summarized_items.clone()
    } else {
        kept
    }
}

fn issue_lines(issues: &[ReviewIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("- {}: {}", i.kind, i.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Feedback stored on the draft for a given verdict.
fn verdict_feedback(verdict: Verdict, attempt: u32, feedback: &str, issues: &[ReviewIssue]) -> String {
    match verdict {
        Verdict::Approved => "Approved.".to_string(),
        Verdict::ReviseAndRetry => {
            let mut text = format!("Revision requested (Attempt {attempt}): {feedback}");
            if !issues.is_empty() {
                text.push_str("\n\nIssues Found:\n");
                text.push_str(&issue_lines(issues));
            }
            text
        }
        Verdict::RejectedFinal => {
            let mut text = format!(
                "Max revision attempts reached. Newsletter NOT approved. Final Feedback: {feedback}"
            );
            if !issues.is_empty() {
                text.push_str("\n\nFinal Issues:\n");
                text.push_str(&issue_lines(issues));
            }
            text
        }
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn name(&self) -> StageName {
        StageName::Review
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let prompt = prompts::review(&state.draft, &fact_sources(&state), self.gate.threshold());
        let schema = self.call.validator().review_schema();

        let (score, feedback, issues) = match self.call.structured(&prompt, &schema).await {
            Ok(record) => {
                let issues: Vec<ReviewIssue> = record
                    .records("issues_found")
                    .iter()
                    .map(|r| ReviewIssue {
                        kind: r.text("type").to_string(),
                        description: r.text("description").to_string(),
                    })
                    .collect();
                (
                    record.score("quality_score"),
                    record.text("feedback").to_string(),
                    issues,
                )
            }
            Err(e) => {
                warn!(error = %e, "Review failed, scoring draft 0.0");
                state.note(StageName::Review, format!("review: {}", e.label()));
                (0.0, REVIEW_FAILED.to_string(), Vec::new())
            }
        };

        let verdict = self.gate.review(score, &mut state.revision_attempts);
        info!(
            score,
            threshold = self.gate.threshold(),
            attempts = state.revision_attempts,
            verdict = %verdict,
            "Draft reviewed"
        );

        state.draft.approval_score = score;
        state.draft.feedback =
            verdict_feedback(verdict, state.revision_attempts, &feedback, &issues);
        state.draft.issues = issues;
        state.approved = verdict == Verdict::Approved;
        state.verdict = Some(verdict);
        state
    }
}
