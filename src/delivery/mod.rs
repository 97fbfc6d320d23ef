//! Outbound side of a run: HTML rendering, mail and file archival.

pub mod archive;
pub mod mailer;
pub mod render;

pub use archive::{Archiver, FileArchiver, archive_file_name, markdown_archive, safe_subject};
pub use mailer::{Mailer, SmtpMailer, UnconfiguredMailer, build_message};
pub use render::{email_html, markdown_to_html};

use std::sync::Arc;

use crate::config::DeliveryConfig;

/// The SMTP mailer when SMTP is configured, otherwise one that always fails.
pub fn mailer_from_config(config: &DeliveryConfig) -> Arc<dyn Mailer> {
    match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(
            smtp.clone(),
            config.sender.clone(),
            config.send_timeout,
        )),
        None => {
            tracing::warn!("SMTP_HOST not set, mail delivery disabled");
            Arc::new(UnconfiguredMailer)
        }
    }
}
