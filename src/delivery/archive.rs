//! File archival of sent (or attempted) digests.

use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::info;

use crate::error::DeliveryError;
use crate::pipeline::state::Draft;

static UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid subject regex"));

const MAX_SUBJECT_CHARS: usize = 50;

/// Persists a rendered artifact.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Store `content` as a `kind` file ("md", "html") and return its path.
    async fn archive(
        &self,
        content: &str,
        kind: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, DeliveryError>;
}

/// Subject reduced to word characters, whitespace and `-`, with spaces as
/// underscores and at most 50 characters.
pub fn safe_subject(subject: &str) -> String {
    UNSAFE
        .replace_all(subject, "")
        .trim()
        .replace(' ', "_")
        .chars()
        .take(MAX_SUBJECT_CHARS)
        .collect()
}

/// `YYYYmmdd_HHMMSS_<safe subject>.<kind>`
pub fn archive_file_name(subject: &str, kind: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{kind}",
        at.format("%Y%m%d_%H%M%S"),
        safe_subject(subject)
    )
}

/// The Markdown archive: a metadata header, `---`, then the body.
pub fn markdown_archive(draft: &Draft, sent_at: Option<DateTime<Utc>>) -> String {
    let date = draft
        .date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let sent = sent_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "Subject: {}\n\nDate: {date}\n\nApproval Score: {:.2}\nFeedback: {}\nRevision Attempts: {}\nSent Timestamp: {sent}\n\n---\n\n{}",
        draft.subject,
        draft.approval_score,
        draft.feedback,
        draft.revision_attempts,
        draft.content_markdown,
    )
}

/// Writes archives into one directory, creating it on first use.
pub struct FileArchiver {
    dir: PathBuf,
}

impl FileArchiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl Archiver for FileArchiver {
    async fn archive(
        &self,
        content: &str,
        kind: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, DeliveryError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(archive_file_name(subject, kind, at));
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), kind, "Digest archived");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 5, 7).unwrap()
    }

    #[test]
    fn subject_is_sanitized() {
        assert_eq!(
            safe_subject("  AI Agent Weekly Digest: 2026-10-16 (Updates!) "),
            "AI_Agent_Weekly_Digest_2026-10-16_Updates"
        );
        assert_eq!(safe_subject(&"x".repeat(80)).len(), 50);
        assert_eq!(safe_subject("?!"), "");
    }

    #[test]
    fn file_name_is_timestamp_then_subject() {
        assert_eq!(
            archive_file_name("Digest: loops", "md", at()),
            "20261016_090507_Digest_loops.md"
        );
    }

    #[test]
    fn markdown_archive_has_header_block() {
        let draft = Draft {
            date: NaiveDate::from_ymd_opt(2026, 10, 16),
            subject: "Digest".into(),
            content_markdown: "## Body".into(),
            approval_score: 0.8333,
            feedback: "Approved.".into(),
            revision_attempts: 1,
            ..Draft::default()
        };
        let text = markdown_archive(&draft, None);
        assert!(text.starts_with("Subject: Digest\n\nDate: 2026-10-16\n\n"));
        assert!(text.contains("Approval Score: 0.83\n"));
        assert!(text.contains("Revision Attempts: 1\n"));
        assert!(text.contains("Sent Timestamp: N/A\n\n---\n\n## Body"));

        let sent = markdown_archive(&draft, Some(at()));
        assert!(sent.contains("Sent Timestamp: 2026-10-16 09:05:07"));
    }

    #[tokio::test]
    async fn file_archiver_creates_directory_and_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let archiver = FileArchiver::new(tmp.path().join("nested/archives"));
        let path = archiver
            .archive("<p>hi</p>", "html", "Digest", at())
            .await
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "20261016_090507_Digest.html"
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>hi</p>");
    }
}
