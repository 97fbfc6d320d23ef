//! Newsletter generation and revision.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use tracing::{info, warn};

use super::ModelCall;
use crate::delivery::email_html;
use crate::pipeline::engine::Stage;
use crate::pipeline::prompts;
use crate::pipeline::state::{Draft, PipelineState, StageName};
use crate::quality::Verdict;

const FAILED_BODY: &str = "## Newsletter Generation Failed\n\nUnfortunately, a critical error occurred during the generation of this week's newsletter content. Please check the system logs for more details.";

/// Chatter models put before the newsletter, removed in order.
static PREAMBLES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(sure,\s*)?here is [^\n]*?:\s*",
        r"(?is)^```json\s*\{.*?\}\s*(```)?\s*",
        r"(?i)^```(markdown|md)?[ \t]*\n*",
        r"(?i)^\s*subject:[^\n]*\n+",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("valid preamble regex"))
    .collect()
});

/// First line carrying `prefix`, without heading markers.
fn extract_subject(text: &str, prefix: &str) -> Option<String> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return None;
    }
    let pattern = format!(
        r"(?im)^[ \t]*(?:#+[ \t]*)?(?:\*\*)?(?:subject:[ \t]*)?({}.*)$",
        regex::escape(prefix)
    );
    let re = Regex::new(&pattern).ok()?;
    let line = re.captures(text)?.get(1)?.as_str().trim();
    let line = line.trim_end_matches(['#', '*']).trim();
    // Case-insensitive match: restore the configured spelling of the prefix.
    let rest = line.get(prefix.len()..).unwrap_or_default();
    Some(format!("{prefix}{rest}"))
}

/// Markdown body with preambles, fences and the subject line removed.
fn clean_body(text: &str, prefix: &str, subject: &str) -> String {
    let mut body = text.trim().to_string();
    for re in PREAMBLES.iter() {
        body = re.replace(&body, "").trim().to_string();
    }
    if let Some(stripped) = body.strip_suffix("```") {
        body = stripped.trim().to_string();
    }

    // The subject line and any repeats of it at the top.
    let mut lines = [subject.trim(), prefix.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            Regex::new(&format!(r"(?im)^[ \t]*(?:#+[ \t]*)?{}[^\n]*\n*", regex::escape(s))).ok()
        });
    if let Some(re) = lines.next() {
        body = re.replacen(&body, 1, "").trim().to_string();
    }
    if let Some(prefix_line) = lines.next() {
        while !body.is_empty() {
            match prefix_line.find(&body) {
                Some(m) if m.start() == 0 => body = body[m.end()..].trim().to_string(),
                _ => break,
            }
        }
    }
    body
}

/// Writes the newsletter from the outline, or rewrites it after a revise verdict.
pub struct ProduceStage {
    call: ModelCall,
    subject_prefix: String,
}

impl ProduceStage {
    pub fn new(call: ModelCall, subject_prefix: impl Into<String>) -> Self {
        Self {
            call,
            subject_prefix: subject_prefix.into(),
        }
    }

    fn fallback_subject(&self, date: NaiveDate) -> String {
        format!("{}{} Updates", self.subject_prefix, date.format("%Y-%m-%d"))
    }

    fn failed_draft(&self, date: NaiveDate, revision_attempts: u32) -> Draft {
        let subject = format!("{} Generation Failed", self.subject_prefix.trim_end());
        Draft {
            date: Some(date),
            content_html: email_html(&subject, date, FAILED_BODY),
            subject,
            content_markdown: FAILED_BODY.to_string(),
            revision_attempts,
            ..Draft::default()
        }
    }

    /// Build a draft from the model's reply.
    fn draft_from_reply(&self, reply: &str, date: NaiveDate, revision_attempts: u32) -> Draft {
        let subject = match extract_subject(reply, &self.subject_prefix) {
            Some(subject) => subject,
            None => {
                warn!("No subject line in generated newsletter, using fallback");
                self.fallback_subject(date)
            }
        };
        let body = clean_body(reply, &self.subject_prefix, &subject);
        Draft {
            date: Some(date),
            content_html: email_html(&subject, date, &body),
            subject,
            content_markdown: body,
            revision_attempts,
            ..Draft::default()
        }
    }
}

#[async_trait]
impl Stage for ProduceStage {
    fn name(&self) -> StageName {
        StageName::Produce
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let date = Utc::now().date_naive();
        let previous = (state.verdict == Some(Verdict::ReviseAndRetry)).then_some(&state.draft);
        info!(
            revision = previous.is_some(),
            attempt = state.revision_attempts,
            articles = state.outline.article_count(),
            "Generating newsletter"
        );

        let prompt = prompts::generation(&state.outline, date, &self.subject_prefix, previous);
        let draft = match self.call.text(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => {
                let draft = self.draft_from_reply(&reply, date, state.revision_attempts);
                info!(subject = %draft.subject, chars = draft.content_markdown.len(), "Draft generated");
                draft
            }
            Ok(_) => {
                warn!("Model returned an empty newsletter");
                state.note(StageName::Produce, "empty newsletter from model");
                self.failed_draft(date, state.revision_attempts)
            }
            Err(e) => {
                warn!(error = %e, "Newsletter generation failed");
                state.note(StageName::Produce, format!("generation: {}", e.label()));
                self.failed_draft(date, state.revision_attempts)
            }
        };
        state.draft = draft;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::testing::{ScriptedLlm, model_call};

    const PREFIX: &str = "AI Agent Weekly Digest: ";

    #[test]
    fn subject_from_heading() {
        let reply = "# AI Agent Weekly Digest: 2026-10-16 Planning Agents\n\n## Intro\nHello";
        assert_eq!(
            extract_subject(reply, PREFIX).as_deref(),
            Some("AI Agent Weekly Digest: 2026-10-16 Planning Agents")
        );
    }

    #[test]
    fn subject_case_is_normalized_to_prefix() {
        let reply = "intro\n## ai agent weekly digest: loops ##\nbody";
        assert_eq!(
            extract_subject(reply, PREFIX).as_deref(),
            Some("AI Agent Weekly Digest: loops")
        );
        assert_eq!(extract_subject("no subject here", PREFIX), None);
    }

    #[test]
    fn body_loses_preamble_fences_and_subject() {
        let reply = "Here is your newsletter:\n```markdown\n# AI Agent Weekly Digest: loops\n\n## Intro\n\nHello\n```";
        let subject = extract_subject(reply, PREFIX).unwrap();
        assert_eq!(clean_body(reply, PREFIX, &subject), "## Intro\n\nHello");
    }

    #[test]
    fn subject_label_line_is_removed() {
        let reply = "Subject: AI Agent Weekly Digest: loops\n\n## Intro";
        let subject = extract_subject(reply, PREFIX).unwrap();
        assert_eq!(subject, "AI Agent Weekly Digest: loops");
        assert_eq!(clean_body(reply, PREFIX, &subject), "## Intro");
    }

    #[tokio::test]
    async fn draft_carries_html_and_attempts() {
        let llm = ScriptedLlm::new([Ok("## Intro\n\n- [LangGraph](https://example.com)")]);
        let stage = ProduceStage::new(model_call(&llm), PREFIX);
        let mut state = PipelineState::default();
        state.revision_attempts = 1;
        let state = stage.run(state).await;

        let draft = &state.draft;
        assert!(draft.subject.starts_with(PREFIX));
        assert!(draft.subject.ends_with(" Updates"));
        assert_eq!(draft.revision_attempts, 1);
        assert!(draft.content_html.contains(r#"<a href="https://example.com">LangGraph</a>"#));
        assert_eq!(draft.approval_score, 0.0);
    }

    #[tokio::test]
    async fn invocation_failure_yields_failed_draft() {
        let llm = ScriptedLlm::new([Err("boom")]);
        let stage = ProduceStage::new(model_call(&llm), PREFIX);
        let state = stage.run(PipelineState::default()).await;
        assert_eq!(state.draft.subject, "AI Agent Weekly Digest: Generation Failed");
        assert_eq!(state.draft.content_markdown, FAILED_BODY);
        assert_eq!(state.notes_for(StageName::Produce).count(), 1);
    }

    #[tokio::test]
    async fn revision_prompt_includes_feedback() {
        let llm = ScriptedLlm::new([Ok("# AI Agent Weekly Digest: v2\n\nBetter")]);
        let stage = ProduceStage::new(model_call(&llm), PREFIX);
        let mut state = PipelineState::default();
        state.verdict = Some(Verdict::ReviseAndRetry);
        state.revision_attempts = 1;
        state.draft.content_markdown = "Old body".into();
        state.draft.feedback = "Cut the fluff.".into();
        let state = stage.run(state).await;

        assert!(llm.prompts.lock().unwrap()[0].contains("Cut the fluff."));
        assert_eq!(state.draft.subject, "AI Agent Weekly Digest: v2");
        assert_eq!(state.draft.content_markdown, "Better");
    }
}
