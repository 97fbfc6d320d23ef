//! Mail and archive the approved draft.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::delivery::{Archiver, Mailer, email_html, markdown_archive};
use crate::pipeline::engine::Stage;
use crate::pipeline::state::{Delivery, PipelineState, StageName};

const SKIPPED_UNAPPROVED: &str = "Newsletter not approved or draft missing. Delivery skipped.";
const SKIPPED_NO_RECIPIENTS: &str = "No recipients configured. Delivery skipped.";
const SENT: &str = "Newsletter sent successfully via SMTP.";

/// Mails an approved draft and archives what was sent.
pub struct DeliverStage {
    mailer: Arc<dyn Mailer>,
    archiver: Arc<dyn Archiver>,
}

impl DeliverStage {
    pub fn new(mailer: Arc<dyn Mailer>, archiver: Arc<dyn Archiver>) -> Self {
        Self { mailer, archiver }
    }
}

#[async_trait]
impl Stage for DeliverStage {
    fn name(&self) -> StageName {
        StageName::Deliver
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        if !state.approved || state.draft.is_empty() {
            info!(approved = state.approved, "Delivery skipped");
            state.delivery = Delivery {
                report: SKIPPED_UNAPPROVED.into(),
                ..Delivery::default()
            };
            return state;
        }
        if state.recipients.is_empty() {
            warn!("No recipients configured");
            state.delivery = Delivery {
                report: SKIPPED_NO_RECIPIENTS.into(),
                ..Delivery::default()
            };
            return state;
        }

        let draft = &state.draft;
        let html = if draft.content_html.trim().is_empty() {
            email_html(
                &draft.subject,
                draft.date.unwrap_or_else(|| Utc::now().date_naive()),
                &draft.content_markdown,
            )
        } else {
            draft.content_html.clone()
        };

        let mut delivery = Delivery::default();
        let mut notes = Vec::new();
        match self.mailer.send(&state.recipients, &draft.subject, &html).await {
            Ok(()) => {
                info!(recipients = state.recipients.len(), subject = %draft.subject, "Newsletter sent");
                delivery.sent = true;
                delivery.sent_at = Some(Utc::now());
                delivery.report = SENT.into();
            }
            Err(e) => {
                error!(error = %e, "Email delivery failed");
                delivery.report = format!("Email delivery failed: {e}");
                notes.push(format!("mail: {e}"));
            }
        }

        let at = delivery.sent_at.unwrap_or_else(Utc::now);
        let markdown = markdown_archive(draft, delivery.sent_at);
        let mut archive_failed = false;
        for (content, kind) in [(markdown.as_str(), "md"), (html.as_str(), "html")] {
            match self.archiver.archive(content, kind, &draft.subject, at).await {
                Ok(path) => delivery.archived.push(path),
                Err(e) => {
                    error!(kind, error = %e, "Archiving failed");
                    notes.push(format!("archive {kind}: {e}"));
                    archive_failed = true;
                }
            }
        }
        if archive_failed {
            delivery.report.push_str(" Archiving failed.");
        }

        for note in notes {
            state.note(StageName::Deliver, note);
        }
        state.delivery = delivery;
        state
    }
}
